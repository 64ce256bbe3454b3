use nalgebra::Vector3;

use crate::pose::LandmarkIndex;
use crate::rig::Skeleton;

use super::bone_map::BoneMap;
use super::canonical::CanonicalBone;
use super::math::{renormalize, rotation_between, slerp_toward};
use super::rest::RestPoseCache;
use super::working::WorkingPose;

/// 方向ベクトルがこれより短ければそのフレームはスキップ（長さの二乗）
const MIN_DIRECTION_SQ: f32 = 1e-6;

/// ボーン方向を決める2点
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoneSource {
    /// from → to のランドマーク
    Pair(LandmarkIndex, LandmarkIndex),
    /// 腰中点 → 肩中点
    Spine,
    /// 肩中点 → 鼻
    Neck,
}

impl BoneSource {
    pub fn endpoints(self, pose: &WorkingPose) -> (Vector3<f32>, Vector3<f32>) {
        match self {
            Self::Pair(from, to) => (pose.point(from), pose.point(to)),
            Self::Spine => (pose.hip_mid(), pose.shoulder_mid()),
            Self::Neck => (pose.shoulder_mid(), pose.point(LandmarkIndex::Nose)),
        }
    }
}

/// 追跡するボーンとランドマークの対応。親 → 子の順に並べる。
pub const BONE_SOURCES: [(CanonicalBone, BoneSource); 10] = {
    use super::canonical::CanonicalBone as B;
    use crate::pose::LandmarkIndex as L;
    [
        (B::Spine, BoneSource::Spine),
        (B::Neck, BoneSource::Neck),
        (B::LeftUpperArm, BoneSource::Pair(L::LeftShoulder, L::LeftElbow)),
        (B::LeftForeArm, BoneSource::Pair(L::LeftElbow, L::LeftWrist)),
        (B::RightUpperArm, BoneSource::Pair(L::RightShoulder, L::RightElbow)),
        (B::RightForeArm, BoneSource::Pair(L::RightElbow, L::RightWrist)),
        (B::LeftUpLeg, BoneSource::Pair(L::LeftHip, L::LeftKnee)),
        (B::LeftLeg, BoneSource::Pair(L::LeftKnee, L::LeftAnkle)),
        (B::RightUpLeg, BoneSource::Pair(L::RightHip, L::RightKnee)),
        (B::RightLeg, BoneSource::Pair(L::RightKnee, L::RightAnkle)),
    ]
};

/// 追跡対象のボーン名
pub fn tracked_bones() -> impl Iterator<Item = CanonicalBone> {
    BONE_SOURCES.iter().map(|(bone, _)| *bone)
}

/// 各ボーンのローカル回転を現在のランドマーク方向に寄せる。更新したボーン数を返す。
///
/// 目標ワールド回転 = (レスト方向 → 現在方向の最短回転) * レスト時ワールド回転。
/// 親のワールド回転は同じパスで更新済みのものを使う。
pub fn solve_bones(
    skeleton: &mut Skeleton,
    bone_map: &BoneMap,
    rest: &RestPoseCache,
    pose: &WorkingPose,
    slerp: f32,
) -> usize {
    let mut updated = 0;

    for (name, source) in BONE_SOURCES {
        let (Some(id), Some(rest_pose)) = (bone_map.get(name), rest.get(name)) else {
            continue;
        };
        let Some(parent) = skeleton.parent(id) else {
            continue;
        };

        let (a, b) = source.endpoints(pose);
        let dir = b - a;
        // NaN/inf は長さ判定をすり抜けるので別に弾く
        if !dir.iter().all(|c| c.is_finite()) || dir.norm_squared() < MIN_DIRECTION_SQ {
            continue;
        }
        let dir = dir.normalize();

        let delta = rotation_between(&rest_pose.direction, &dir);
        let world_target = delta * rest_pose.world_rotation;
        let local_target = renormalize(&(skeleton.world_rotation(parent).inverse() * world_target));

        let bone = skeleton.bone_mut(id);
        bone.rotation = slerp_toward(&bone.rotation, &local_target, slerp);
        updated += 1;
    }

    updated
}
