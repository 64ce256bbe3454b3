use tracing::debug;

use crate::pose::{LandmarkIndex, PoseFrame};

use super::working::LandmarkSpace;

/// 一度きりのキャリブレーション状態
///
/// 両フラグとも false → true に1回だけ遷移する（`reset` を除く）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CalibrationState {
    /// 入力空間の「上」の符号 (+1 / -1)
    pub y_sign: f32,
    pub y_calibrated: bool,
    /// 正規化ランドマーク単位 → リグの長さ単位
    pub scale: f32,
    pub scale_calibrated: bool,
}

impl Default for CalibrationState {
    fn default() -> Self {
        Self {
            y_sign: 1.0,
            y_calibrated: false,
            scale: 1.0,
            scale_calibrated: false,
        }
    }
}

impl CalibrationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// 肩幅からスケールを決める。2回目以降は無視。
    ///
    /// `rig_shoulder_width` はリグの左右肩ボーン間のワールド距離。リグに肩ボーンがなければ None で、
    /// スケールは 1.0 のまま確定する。ランドマークが1つもないフレームでは確定しない。
    pub fn calibrate_scale(&mut self, frame: &PoseFrame, rig_shoulder_width: Option<f32>) {
        if self.scale_calibrated || !frame.is_complete() {
            return;
        }

        let (space, landmarks) = LandmarkSpace::select(frame);
        let ls = space.raw_point(&landmarks[LandmarkIndex::LeftShoulder as usize], 1.0);
        let rs = space.raw_point(&landmarks[LandmarkIndex::RightShoulder as usize], 1.0);
        let pose_width = match (ls - rs).norm() {
            w if w > 0.0 && w.is_finite() => w,
            _ => 1.0,
        };

        if let Some(rig_width) = rig_shoulder_width {
            let rig_width = if rig_width > 0.0 { rig_width } else { 1.0 };
            self.scale = rig_width / pose_width;
        }
        self.scale_calibrated = true;
        debug!(scale = self.scale, ?space, "scale calibrated");
    }

    /// 肩中点が腰中点より上になるようにY符号を決める。2回目以降は無視。
    pub fn calibrate_y_sign(&mut self, frame: &PoseFrame) {
        if self.y_calibrated || !frame.is_complete() {
            return;
        }

        let (space, landmarks) = LandmarkSpace::select(frame);
        let raw = |i: LandmarkIndex| space.raw_point(&landmarks[i as usize], self.scale);
        let mid_y = |l: LandmarkIndex, r: LandmarkIndex| (raw(l).y + raw(r).y) * 0.5;
        let hip_y = mid_y(LandmarkIndex::LeftHip, LandmarkIndex::RightHip);
        let shoulder_y = mid_y(LandmarkIndex::LeftShoulder, LandmarkIndex::RightShoulder);

        self.y_sign = if shoulder_y >= hip_y { 1.0 } else { -1.0 };
        self.y_calibrated = true;
        debug!(y_sign = self.y_sign, ?space, "y sign calibrated");
    }
}
