use crate::rig::{BoneId, Skeleton};

use super::bone_map::BoneMap;
use super::canonical::CanonicalBone;

/// 1フレームで詰める割合（一気にスナップしない）
pub const GROUND_CORRECTION: f32 = 0.5;

/// 接地判定に使う末端ボーン。細かいボーンがないリグでは脚にフォールバックする。
pub const FOOT_CANDIDATES: [CanonicalBone; 8] = [
    CanonicalBone::LeftToe,
    CanonicalBone::RightToe,
    CanonicalBone::LeftFoot,
    CanonicalBone::RightFoot,
    CanonicalBone::LeftLeg,
    CanonicalBone::RightLeg,
    CanonicalBone::LeftUpLeg,
    CanonicalBone::RightUpLeg,
];

/// 末端ボーンのワールドYの最小値。候補が1つもなければ None。
pub fn lowest_extremity_y(skeleton: &Skeleton, bone_map: &BoneMap) -> Option<f32> {
    FOOT_CANDIDATES
        .iter()
        .filter_map(|b| bone_map.get(*b))
        .map(|id| skeleton.world_position(id).y)
        .reduce(f32::min)
}

/// 最下点が `ground_y` に近づくようルートを上下させる。動かした量を返す。
///
/// ボーン回転をすべて反映した後に呼ぶこと。
pub fn correct_ground(
    skeleton: &mut Skeleton,
    bone_map: &BoneMap,
    root: BoneId,
    ground_y: f32,
) -> f32 {
    let Some(min_y) = lowest_extremity_y(skeleton, bone_map) else {
        return 0.0;
    };
    let step = (ground_y - min_y) * GROUND_CORRECTION;
    skeleton.bone_mut(root).translation.y += step;
    step
}
