use nalgebra::{UnitQuaternion, Vector3};

use crate::pose::LandmarkIndex;
use crate::rig::{BoneId, Skeleton};

use super::math::{rotation_between, slerp_toward};
use super::working::WorkingPose;

/// 位置の追従率（固定）
pub const POSITION_SMOOTHING: f32 = 0.4;
/// Yawの追従率（固定）
pub const YAW_SMOOTHING: f32 = 0.3;

/// 水平投影した前方ベクトルがこれ以下なら真横向きとみなしてyawを更新しない（長さの二乗）
const MIN_FORWARD_SQ: f32 = 1e-6;

/// リグ正面の基準方向
fn reference_forward() -> Vector3<f32> {
    Vector3::new(0.0, 0.0, -1.0)
}

/// ルート（腰）トラッカー
///
/// - 左右ヒップの中点にXZを追従（Yは接地補正が持つ）
/// - 胴体の向きからyawを作る
#[derive(Debug, Clone)]
pub struct RootSolver {
    root: BoneId,
    /// バインド時のルート位置
    base_translation: Vector3<f32>,
    /// 動的yawを掛ける前のルート回転
    base_rotation: UnitQuaternion<f32>,
}

impl RootSolver {
    pub fn new(skeleton: &Skeleton, root: BoneId) -> Self {
        let bone = skeleton.bone(root);
        Self {
            root,
            base_translation: bone.translation,
            base_rotation: bone.rotation,
        }
    }

    pub fn root(&self) -> BoneId {
        self.root
    }

    pub fn base_rotation(&self) -> UnitQuaternion<f32> {
        self.base_rotation
    }

    /// ルートをバインド時の位置・回転に戻す
    pub fn restore(&self, skeleton: &mut Skeleton) {
        let bone = skeleton.bone_mut(self.root);
        bone.translation = self.base_translation;
        bone.rotation = self.base_rotation;
    }

    /// 1フレーム分ルートを動かす。yawを更新したら true。
    pub fn solve(&self, skeleton: &mut Skeleton, pose: &WorkingPose) -> bool {
        let hip_mid = pose.hip_mid();
        let root = skeleton.bone_mut(self.root);

        if hip_mid.x.is_finite() && hip_mid.z.is_finite() {
            let target = Vector3::new(hip_mid.x, root.translation.y, hip_mid.z);
            root.translation = root.translation.lerp(&target, POSITION_SMOOTHING);
        }

        match Self::facing_yaw(pose) {
            Some(yaw) => {
                let target = self.base_rotation * yaw;
                root.rotation = slerp_toward(&root.rotation, &target, YAW_SMOOTHING);
                true
            }
            None => false,
        }
    }

    /// 胴体の正面方向を水平面に投影し、基準方向からの回転を返す。
    /// 真横から見ていて正面が決まらない場合は None。
    pub fn facing_yaw(pose: &WorkingPose) -> Option<UnitQuaternion<f32>> {
        let torso = [
            pose.hip_mid(),
            pose.shoulder_mid(),
            pose.point(LandmarkIndex::LeftShoulder),
            pose.point(LandmarkIndex::RightShoulder),
        ];
        if !torso.iter().all(|p| p.iter().all(|c| c.is_finite())) {
            return None;
        }
        let [hip, shoulder, ls, rs] = torso;
        let up = (shoulder - hip).try_normalize(f32::EPSILON)?;
        let right = (rs - ls).try_normalize(f32::EPSILON)?;
        let forward = up.cross(&right).try_normalize(f32::EPSILON)?;

        let projected = Vector3::new(forward.x, 0.0, forward.z);
        if projected.norm_squared() <= MIN_FORWARD_SQ {
            return None;
        }
        Some(rotation_between(&reference_forward(), &projected.normalize()))
    }
}
