use thiserror::Error;

/// リグのバインド時に検出する契約違反
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BindError {
    #[error("skeleton has no bones")]
    EmptySkeleton,
    #[error("cannot determine root node: {0} top-level nodes and no Hips bone")]
    NoRoot(usize),
}
