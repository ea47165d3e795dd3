use bitflags::bitflags;

bitflags! {
    /// Rights carried by a handle
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct Rights: u32 {
        const NONE = 0;
        const DUPLICATE = 1 << 0;
        const TRANSFER = 1 << 1;
        const READ = 1 << 2;
        const WRITE = 1 << 3;
        const SIGNAL = 1 << 12;
        const WAIT = 1 << 14;
        const INSPECT = 1 << 15;

        const SAME_RIGHTS = 1 << 31;

        const BASIC = Self::TRANSFER.bits() | Self::DUPLICATE.bits() |
                      Self::WAIT.bits() | Self::INSPECT.bits();

        const EVENT_DEFAULT = Self::BASIC.bits() | Self::SIGNAL.bits();
    }
}
