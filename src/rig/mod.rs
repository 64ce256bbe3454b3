pub mod skeleton;

pub use skeleton::{Bone, BoneId, Skeleton};
