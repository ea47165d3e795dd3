use ash::vk;

pub const SIZE_HISTORY_LEN: usize = 4;

/// Recent sizes and frames-since-flush, for pools deciding whether a surface is worth keeping
#[derive(Clone, Debug, Default)]
pub struct SizeHistory {
    sizes: [vk::Extent2D; SIZE_HISTORY_LEN],
    index: usize,
    age: usize,
}

impl SizeHistory {
    pub fn clear(&mut self) {
        self.sizes = [vk::Extent2D::default(); SIZE_HISTORY_LEN];
        self.index = 0;
    }

    /// Record `size` for this frame and return the new age
    pub fn advance(&mut self, size: vk::Extent2D) -> usize {
        self.sizes[self.index] = size;
        self.index = (self.index + 1) % SIZE_HISTORY_LEN;
        self.age += 1;
        self.age
    }

    pub fn reset_age(&mut self) {
        self.age = 0;
    }

    pub fn age(&self) -> usize {
        self.age
    }

    /// Recorded sizes in ring order; unwritten slots are 0x0
    pub fn sizes(&self) -> &[vk::Extent2D; SIZE_HISTORY_LEN] {
        &self.sizes
    }
}
