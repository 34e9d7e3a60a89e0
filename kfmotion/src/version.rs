//! Wire format version for serialized keyframe motions.

/// Major version of the motion wire format. A stream with any other major
/// version is rejected outright.
pub const KEYFRAME_MOTION_VERSION: u16 = 1;

/// Subversion of the motion wire format.
pub const KEYFRAME_MOTION_SUBVERSION: u16 = 0;
