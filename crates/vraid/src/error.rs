use vraid_blockdev::DeviceError;

/// Errors returned by the engine's operations.
#[derive(Debug, thiserror::Error)]
pub enum RaidError {
    /// No array is configured on the disks.
    #[error("no raid array is configured")]
    NotConfigured,
    /// An array is already configured; destroy it first.
    #[error("a raid array is already configured")]
    AlreadyConfigured,
    /// The disk count does not satisfy the requested level's shape
    /// constraints, or the disks do not share a geometry.
    #[error("disk layout does not fit the requested raid level")]
    ShapeMismatch,
    /// The logical block number lies outside the array.
    #[error("logical block {0} is out of range")]
    BadBlock(u32),
    /// The disk index lies outside 1..=disks.
    #[error("disk {0} is out of range")]
    BadDisk(u32),
    /// The block cannot be read: the holding disk is broken and no redundant
    /// copy can be assembled.
    #[error("block cannot be read, disk is broken")]
    ReadBroken,
    /// The block could not be written anywhere: the holding disk is broken
    /// and no redundant copy could be made either.
    #[error("block cannot be written, disk is broken")]
    WriteBroken,
    /// The caller's output buffer could not take a full block.
    #[error("copy to caller buffer failed")]
    CopyOut,
    /// The caller's input buffer did not hold a full block.
    #[error("copy from caller buffer failed")]
    CopyIn,
    /// The disk is already marked broken.
    #[error("disk is already broken")]
    AlreadyBroken,
    /// The disk is not marked broken.
    #[error("disk is not broken")]
    NotBroken,
    /// A scratch buffer could not be allocated.
    #[error("out of memory")]
    OutOfMemory,
    /// The underlying device failed.
    #[error(transparent)]
    Device(#[from] DeviceError),
}

impl RaidError {
    /// Stable numeric code for this error, for embedders that surface engine
    /// failures as plain integers (the CLI uses it as its exit status).
    pub fn code(&self) -> i32 {
        match self {
            Self::NotConfigured => -1,
            Self::AlreadyConfigured => -2,
            Self::ShapeMismatch => -3,
            Self::BadBlock(_) => -4,
            Self::BadDisk(_) => -5,
            Self::ReadBroken => -6,
            Self::WriteBroken => -7,
            Self::CopyOut => -8,
            Self::CopyIn => -9,
            Self::AlreadyBroken => -10,
            Self::NotBroken => -11,
            Self::OutOfMemory => -12,
            Self::Device(_) => -13,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        assert_eq!(RaidError::NotConfigured.code(), -1);
        assert_eq!(RaidError::AlreadyConfigured.code(), -2);
        assert_eq!(RaidError::ShapeMismatch.code(), -3);
        assert_eq!(RaidError::BadBlock(9).code(), -4);
        assert_eq!(RaidError::BadDisk(9).code(), -5);
        assert_eq!(RaidError::ReadBroken.code(), -6);
        assert_eq!(RaidError::WriteBroken.code(), -7);
        assert_eq!(RaidError::CopyOut.code(), -8);
        assert_eq!(RaidError::CopyIn.code(), -9);
        assert_eq!(RaidError::AlreadyBroken.code(), -10);
        assert_eq!(RaidError::NotBroken.code(), -11);
        assert_eq!(RaidError::OutOfMemory.code(), -12);
    }
}
