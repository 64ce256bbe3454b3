use nalgebra::Vector3;

use crate::pose::{Landmark, LandmarkIndex, PoseFrame};

/// ランドマークの座標空間
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LandmarkSpace {
    /// 画像正規化座標 (0-1, Y下向き)
    Normalized,
    /// メートル単位のワールド座標
    World,
}

impl LandmarkSpace {
    /// ワールド座標があればそちらを優先
    pub fn select(frame: &PoseFrame) -> (Self, &[Landmark]) {
        match frame.world() {
            Some(world) => (Self::World, world),
            None => (Self::Normalized, &frame.landmarks),
        }
    }

    /// 符号・ミラー補正前の作業座標（Y上向き, Z手前向き）
    pub fn raw_point(self, lm: &Landmark, scale: f32) -> Vector3<f32> {
        match self {
            Self::Normalized => Vector3::new((lm.x - 0.5) * 2.0, (0.5 - lm.y) * 2.0, -lm.z),
            Self::World => Vector3::new(lm.x * scale, lm.y * scale, -lm.z * scale),
        }
    }
}

/// 1フレーム分の作業座標。エンジンが保持して毎フレーム上書きする。
///
/// Y符号とXミラーは `fill` で各点に1回だけ適用し、中点などの派生点はすべて補正済みの点から作る。
#[derive(Debug, Clone)]
pub struct WorkingPose {
    points: [Vector3<f32>; LandmarkIndex::COUNT],
    hip_mid: Vector3<f32>,
    shoulder_mid: Vector3<f32>,
}

impl Default for WorkingPose {
    fn default() -> Self {
        Self {
            points: [Vector3::zeros(); LandmarkIndex::COUNT],
            hip_mid: Vector3::zeros(),
            shoulder_mid: Vector3::zeros(),
        }
    }
}

impl WorkingPose {
    pub fn fill(
        &mut self,
        space: LandmarkSpace,
        landmarks: &[Landmark],
        scale: f32,
        y_sign: f32,
        mirror_x: bool,
    ) {
        for (out, lm) in self.points.iter_mut().zip(landmarks) {
            let mut p = space.raw_point(lm, scale);
            p.y *= y_sign;
            if mirror_x {
                p.x = -p.x;
            }
            *out = p;
        }
        let mid = |l: LandmarkIndex, r: LandmarkIndex| (self.point(l) + self.point(r)) * 0.5;
        let hip_mid = mid(LandmarkIndex::LeftHip, LandmarkIndex::RightHip);
        let shoulder_mid = mid(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);
        self.hip_mid = hip_mid;
        self.shoulder_mid = shoulder_mid;
    }

    pub fn point(&self, index: LandmarkIndex) -> Vector3<f32> {
        self.points[index as usize]
    }

    pub fn hip_mid(&self) -> Vector3<f32> {
        self.hip_mid
    }

    pub fn shoulder_mid(&self) -> Vector3<f32> {
        self.shoulder_mid
    }
}
