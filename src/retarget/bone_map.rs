use std::collections::HashMap;

use crate::rig::{BoneId, Skeleton};

use super::canonical::{canonicalize, CanonicalBone};

/// 正規名 → リグのボーン
///
/// リグ1体につき1回構築する。複数の生ボーン名が同じ正規名になる場合は最初のものを採用。
#[derive(Debug, Clone, Default)]
pub struct BoneMap {
    bones: HashMap<CanonicalBone, BoneId>,
}

impl BoneMap {
    pub fn build(skeleton: &Skeleton) -> Self {
        let mut bones = HashMap::new();
        for (id, bone) in skeleton.iter() {
            if let Some(canon) = CanonicalBone::from_canonical(&canonicalize(&bone.name)) {
                bones.entry(canon).or_insert(id);
            }
        }

        // Spine がなく Spine1 しかないリグ
        if !bones.contains_key(&CanonicalBone::Spine) {
            if let Some(&spine1) = bones.get(&CanonicalBone::Spine1) {
                bones.insert(CanonicalBone::Spine, spine1);
            }
        }

        Self { bones }
    }

    pub fn get(&self, bone: CanonicalBone) -> Option<BoneId> {
        self.bones.get(&bone).copied()
    }

    pub fn contains(&self, bone: CanonicalBone) -> bool {
        self.bones.contains_key(&bone)
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    /// `expected` のうちリグに存在しないもの
    pub fn missing<'a, I>(&self, expected: I) -> Vec<CanonicalBone>
    where
        I: IntoIterator<Item = &'a CanonicalBone>,
    {
        expected
            .into_iter()
            .copied()
            .filter(|b| !self.contains(*b))
            .collect()
    }
}
