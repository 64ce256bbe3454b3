use nalgebra::{UnitQuaternion, Vector3};
use std::collections::HashMap;

use crate::rig::Skeleton;

use super::bone_map::BoneMap;
use super::bones::tracked_bones;
use super::canonical::CanonicalBone;

/// バインドポーズでのボーン方向とワールド回転
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestPose {
    /// ボーン → 子ボーンのワールド単位ベクトル
    pub direction: Vector3<f32>,
    pub world_rotation: UnitQuaternion<f32>,
}

/// レストポーズキャッシュ。最初の capture 後は reset まで不変。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RestPoseCache {
    entries: HashMap<CanonicalBone, RestPose>,
    captured: bool,
}

impl RestPoseCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_captured(&self) -> bool {
        self.captured
    }

    /// 追跡ボーンのバインドポーズを記録する。記録済みなら何もしない。
    ///
    /// 子ボーンを持たない（方向が決まらない）ボーンは記録せず、以後の回転計算からも外れる。
    pub fn capture(&mut self, skeleton: &Skeleton, bone_map: &BoneMap) {
        if self.captured {
            return;
        }
        for name in tracked_bones() {
            let Some(id) = bone_map.get(name) else {
                continue;
            };
            let Some(child) = skeleton.first_child(id) else {
                continue;
            };
            let bone_world = skeleton.world_transform(id);
            let offset = skeleton.world_position(child) - bone_world.translation.vector;
            let Some(direction) = offset.try_normalize(1e-6) else {
                continue;
            };
            self.entries.insert(
                name,
                RestPose {
                    direction,
                    world_rotation: bone_world.rotation,
                },
            );
        }
        self.captured = true;
    }

    pub fn get(&self, bone: CanonicalBone) -> Option<&RestPose> {
        self.entries.get(&bone)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.captured = false;
    }
}
