pub mod bone_map;
pub mod bones;
pub mod calibration;
pub mod canonical;
pub mod ground;
pub mod math;
pub mod rest;
pub mod root;
pub mod working;

pub use bone_map::BoneMap;
pub use bones::{BoneSource, BONE_SOURCES};
pub use calibration::CalibrationState;
pub use canonical::{canonicalize, CanonicalBone};
pub use rest::{RestPose, RestPoseCache};
pub use root::RootSolver;

use tracing::warn;

use crate::config::RetargetConfig;
use crate::error::BindError;
use crate::pose::PoseFrame;
use crate::rig::{BoneId, Skeleton};

use working::{LandmarkSpace, WorkingPose};

/// `update` 1回分の結果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    /// 回転を更新したボーン数
    pub bones_updated: usize,
    pub yaw_updated: bool,
    /// 接地補正でルートを動かした量
    pub ground_delta: f32,
}

/// ランドマーク → リグのリターゲッタ
///
/// リグ1体につき1インスタンス。`update` は描画ループから1フレーム1回、単一スレッドで呼ぶ。
pub struct Retargeter {
    skeleton: Skeleton,
    bone_map: BoneMap,
    rest: RestPoseCache,
    calibration: CalibrationState,
    root: RootSolver,
    scratch: WorkingPose,
}

impl Retargeter {
    /// リグをバインドする。リグの所有権はリターゲッタに移る。
    ///
    /// ルートは Hips の親（Hips が最上位ならHips自身）、Hips がなければ唯一の最上位ノード。
    pub fn bind(skeleton: Skeleton) -> Result<Self, BindError> {
        if skeleton.is_empty() {
            return Err(BindError::EmptySkeleton);
        }
        let bone_map = BoneMap::build(&skeleton);

        let root = match bone_map.get(CanonicalBone::Hips) {
            Some(hips) => skeleton.parent(hips).unwrap_or(hips),
            None => match skeleton.roots().as_slice() {
                [only] => *only,
                roots => return Err(BindError::NoRoot(roots.len())),
            },
        };

        let missing = bone_map.missing(BONE_SOURCES.iter().map(|(bone, _)| bone));
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|b| b.as_str()).collect();
            warn!(missing = ?names, "rig is missing tracked bones");
        }

        let root = RootSolver::new(&skeleton, root);
        Ok(Self {
            skeleton,
            bone_map,
            rest: RestPoseCache::new(),
            calibration: CalibrationState::new(),
            root,
            scratch: WorkingPose::default(),
        })
    }

    pub fn skeleton(&self) -> &Skeleton {
        &self.skeleton
    }

    /// リグへの一回限りの補正用。rest 取得後にボーンを動かすと基準がずれる。
    pub fn skeleton_mut(&mut self) -> &mut Skeleton {
        &mut self.skeleton
    }

    pub fn into_skeleton(self) -> Skeleton {
        self.skeleton
    }

    pub fn bone_map(&self) -> &BoneMap {
        &self.bone_map
    }

    pub fn rest_cache(&self) -> &RestPoseCache {
        &self.rest
    }

    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    pub fn root_id(&self) -> BoneId {
        self.root.root()
    }

    /// バインドポーズを記録する。記録済みなら何もしない。
    pub fn cache_rest(&mut self) {
        self.rest.capture(&self.skeleton, &self.bone_map);
    }

    /// レストポーズを破棄する。次の `cache_rest` / `update` で取り直す。
    pub fn reset_rest(&mut self) {
        self.rest.clear();
    }

    /// Hips のワールド位置がルート原点に来るようリグをずらす。
    /// レスト取得後や Hips がない場合は何もせず false。
    pub fn recenter_on_hips(&mut self) -> bool {
        if self.rest.is_captured() {
            return false;
        }
        let Some(hips) = self.bone_map.get(CanonicalBone::Hips) else {
            return false;
        };
        let root = self.root.root();
        if hips == root {
            return false;
        }
        self.skeleton.recenter(root, hips);
        true
    }

    /// 肩幅からスケールを一度だけ決める
    pub fn calibrate_scale_from_pose(&mut self, frame: &PoseFrame) {
        let rig_width = match (
            self.bone_map.get(CanonicalBone::LeftShoulder),
            self.bone_map.get(CanonicalBone::RightShoulder),
        ) {
            (Some(l), Some(r)) => {
                Some((self.skeleton.world_position(l) - self.skeleton.world_position(r)).norm())
            }
            _ => None,
        };
        self.calibration.calibrate_scale(frame, rig_width);
    }

    /// キャリブレーションを捨て、ルートをバインド時の位置・回転に戻す
    pub fn reset(&mut self) {
        self.calibration.reset();
        self.root.restore(&mut self.skeleton);
    }

    /// 1フレーム分リグを動かす。
    ///
    /// ルート → ボーン → 接地 の順。33点揃っていないフレームは何もしない。
    pub fn update(&mut self, frame: &PoseFrame, config: &RetargetConfig) -> FrameReport {
        if !frame.is_complete() {
            return FrameReport::default();
        }
        self.cache_rest();

        if !self.calibration.scale_calibrated {
            self.calibrate_scale_from_pose(frame);
        }
        self.calibration.calibrate_y_sign(frame);

        let (space, landmarks) = LandmarkSpace::select(frame);
        self.scratch.fill(
            space,
            landmarks,
            self.calibration.scale,
            self.calibration.y_sign,
            config.mirror_x,
        );

        let yaw_updated = self.root.solve(&mut self.skeleton, &self.scratch);

        let bones_updated = bones::solve_bones(
            &mut self.skeleton,
            &self.bone_map,
            &self.rest,
            &self.scratch,
            config.slerp(),
        );

        let ground_delta = ground::correct_ground(
            &mut self.skeleton,
            &self.bone_map,
            self.root.root(),
            config.ground_y,
        );

        FrameReport {
            bones_updated,
            yaw_updated,
            ground_delta,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::{Landmark, LandmarkIndex};
    use crate::retarget::math::tests::{approx_eq_quat, approx_eq_vec};
    use nalgebra::{UnitQuaternion, Vector3};
    use std::f32::consts::FRAC_PI_4;

    fn ident() -> UnitQuaternion<f32> {
        UnitQuaternion::identity()
    }

    /// Root → Hips → (Spine → Neck → Head, LeftUpperArm → LeftForeArm → LeftHand, 脚)
    /// 回転なしのボーンを "mixamorig:" 付きで追加
    fn add(sk: &mut Skeleton, name: &str, parent: Option<BoneId>, [x, y, z]: [f32; 3]) -> BoneId {
        let name = format!("mixamorig:{name}");
        sk.add_bone(&name, parent, Vector3::new(x, y, z), ident())
    }

    fn humanoid() -> Skeleton {
        let mut sk = Skeleton::new();
        let root = sk.add_bone("Root", None, Vector3::zeros(), ident());
        let hips = add(&mut sk, "Hips", Some(root), [0.0, 0.0, 0.0]);
        let spine = add(&mut sk, "Spine", Some(hips), [0.0, 0.3, 0.0]);
        let neck = add(&mut sk, "Neck", Some(spine), [0.0, 0.3, 0.0]);
        add(&mut sk, "Head", Some(neck), [0.0, 0.1, 0.0]);
        let lu = add(&mut sk, "LeftArm", Some(hips), [0.2, 0.5, 0.0]);
        let lf = add(&mut sk, "LeftForeArm", Some(lu), [0.0, -0.3, 0.0]);
        add(&mut sk, "LeftHand", Some(lf), [0.0, -0.3, 0.0]);
        for (side, x) in [("Left", 0.1), ("Right", -0.1)] {
            let up = add(&mut sk, &format!("{side}UpLeg"), Some(hips), [x, 0.0, 0.0]);
            let leg = add(&mut sk, &format!("{side}Leg"), Some(up), [0.0, -0.45, 0.0]);
            let foot = add(&mut sk, &format!("{side}Foot"), Some(leg), [0.0, -0.45, 0.0]);
            add(&mut sk, &format!("{side}ToeBase"), Some(foot), [0.0, -0.05, 0.1]);
        }
        sk
    }

    /// World空間の正面向き立ち姿。作業座標がそのまま指定値になるようにZを反転して入れる。
    fn standing_world() -> Vec<Landmark> {
        let mut lms = vec![Landmark::default(); LandmarkIndex::COUNT];
        let mut put = |i: LandmarkIndex, x: f32, y: f32, z: f32| {
            lms[i as usize] = Landmark::new(x, y, -z);
        };
        put(LandmarkIndex::Nose, 0.0, 0.7, 0.05);
        put(LandmarkIndex::LeftShoulder, -0.2, 0.5, 0.0);
        put(LandmarkIndex::RightShoulder, 0.2, 0.5, 0.0);
        put(LandmarkIndex::LeftElbow, -0.25, 0.2, 0.0);
        put(LandmarkIndex::RightElbow, 0.25, 0.2, 0.0);
        put(LandmarkIndex::LeftWrist, -0.25, -0.1, 0.1);
        put(LandmarkIndex::RightWrist, 0.25, -0.1, 0.1);
        put(LandmarkIndex::LeftHip, -0.1, 0.0, 0.0);
        put(LandmarkIndex::RightHip, 0.1, 0.0, 0.0);
        put(LandmarkIndex::LeftKnee, -0.12, -0.45, 0.05);
        put(LandmarkIndex::RightKnee, 0.12, -0.45, 0.0);
        put(LandmarkIndex::LeftAnkle, -0.12, -0.9, 0.0);
        put(LandmarkIndex::RightAnkle, 0.14, -0.9, -0.05);
        lms
    }

    fn world_frame(world: Vec<Landmark>) -> PoseFrame {
        PoseFrame::new(vec![Landmark::new(0.5, 0.5, 0.0); LandmarkIndex::COUNT]).with_world(world)
    }

    fn config(slerp: f32, mirror_x: bool) -> RetargetConfig {
        RetargetConfig {
            slerp_factor: slerp,
            mirror_x,
            ground_y: -1.0,
        }
    }

    fn bone(rt: &Retargeter, b: CanonicalBone) -> BoneId {
        rt.bone_map().get(b).unwrap()
    }

    #[test]
    fn test_bind_errors() {
        assert_eq!(Retargeter::bind(Skeleton::new()).err(), Some(BindError::EmptySkeleton));

        let mut sk = Skeleton::new();
        sk.add_bone("A", None, Vector3::zeros(), ident());
        sk.add_bone("B", None, Vector3::zeros(), ident());
        assert_eq!(Retargeter::bind(sk).err(), Some(BindError::NoRoot(2)));
    }

    #[test]
    fn test_root_is_hips_parent() {
        let rt = Retargeter::bind(humanoid()).unwrap();
        assert_eq!(rt.skeleton().bone(rt.root_id()).name, "Root");
    }

    #[test]
    fn test_top_level_hips_is_root() {
        let mut sk = Skeleton::new();
        let hips = sk.add_bone("Hips", None, Vector3::zeros(), ident());
        sk.add_bone("Spine", Some(hips), Vector3::new(0.0, 0.2, 0.0), ident());
        let rt = Retargeter::bind(sk).unwrap();
        assert_eq!(rt.root_id(), hips);
    }

    #[test]
    fn test_empty_frame_is_noop() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        let before = rt.skeleton().clone();
        let report = rt.update(&PoseFrame::default(), &RetargetConfig::default());
        assert_eq!(report, FrameReport::default());
        assert!(!rt.calibration().y_calibrated);
        assert!(!rt.rest_cache().is_captured());
        for ((_, a), (_, b)) in rt.skeleton().iter().zip(before.iter()) {
            assert_eq!(a.rotation, b.rotation);
            assert_eq!(a.translation, b.translation);
        }
    }

    #[test]
    fn test_end_to_end_left_upper_arm_45_degrees() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        rt.cache_rest();
        let rest = rt.rest_cache().get(CanonicalBone::LeftUpperArm).unwrap();
        assert!(approx_eq_vec(&rest.direction, &Vector3::new(0.0, -1.0, 0.0), 1e-6));
        assert!(approx_eq_quat(&rest.world_rotation, &ident(), 1e-6));

        let mut world = standing_world();
        world[LandmarkIndex::LeftShoulder as usize] = Landmark::new(0.0, 0.5, 0.0);
        world[LandmarkIndex::LeftElbow as usize] = Landmark::new(1.0, -0.5, 0.0);
        // 右肩を +X に置いて正面向き（yawは恒等）を保つ
        world[LandmarkIndex::RightShoulder as usize] = Landmark::new(0.4, 0.5, 0.0);

        let report = rt.update(&world_frame(world), &config(1.0, false));
        assert!(report.yaw_updated);

        let expected = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), FRAC_PI_4);
        let local = rt.skeleton().bone(bone(&rt, CanonicalBone::LeftUpperArm)).rotation;
        assert!(approx_eq_quat(&local, &expected, 1e-5), "got {:?}", local);
    }

    #[test]
    fn test_degenerate_upper_arm_unchanged() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        let cfg = config(0.35, false);
        rt.update(&world_frame(standing_world()), &cfg);

        let arm = bone(&rt, CanonicalBone::LeftUpperArm);
        let before = rt.skeleton().bone(arm).rotation;

        let mut world = standing_world();
        world[LandmarkIndex::LeftElbow as usize] = world[LandmarkIndex::LeftShoulder as usize];
        rt.update(&world_frame(world), &cfg);
        assert_eq!(rt.skeleton().bone(arm).rotation, before);
    }

    /// World座標の立ち姿を正規化画像座標に写したフレーム（world なし）
    fn normalized_frame(world: &[Landmark]) -> PoseFrame {
        let lms = world
            .iter()
            .map(|lm| Landmark::new(0.5 + lm.x * 0.5, 0.5 - lm.y * 0.5, lm.z))
            .collect();
        PoseFrame::new(lms)
    }

    #[test]
    fn test_non_finite_landmark_does_not_poison_rig() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        let cfg = config(0.35, false);
        let good = normalized_frame(&standing_world());
        rt.update(&good, &cfg);

        let arm = bone(&rt, CanonicalBone::LeftUpperArm);
        let root = rt.root_id();
        let before = rt.skeleton().bone(arm).rotation;

        let mut world = standing_world();
        world[LandmarkIndex::LeftElbow as usize].x = f32::NAN;
        rt.update(&normalized_frame(&world), &cfg);
        assert_eq!(rt.skeleton().bone(arm).rotation, before);

        // 次の正常フレームで追従を再開し、NaN が残らない
        rt.update(&good, &cfg);
        for (_, b) in rt.skeleton().iter() {
            assert!(b.rotation.coords.iter().all(|c| c.is_finite()), "bone {}", b.name);
            assert!(b.translation.iter().all(|c| c.is_finite()), "bone {}", b.name);
        }
        assert_ne!(rt.skeleton().bone(arm).rotation, before);
        assert!(rt.skeleton().bone(root).translation.y.is_finite());
    }

    #[test]
    fn test_bone_rotations_stay_unit() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        let cfg = RetargetConfig::default();
        let frame = world_frame(standing_world());
        for _ in 0..20 {
            rt.update(&frame, &cfg);
            for (_, b) in rt.skeleton().iter() {
                let norm = b.rotation.coords.norm();
                assert!((norm - 1.0).abs() < 1e-6, "bone {} norm {}", b.name, norm);
            }
        }
    }

    #[test]
    fn test_calibration_fires_once() {
        let mut sk = humanoid();
        let hips = sk.find("mixamorig:Hips").unwrap();
        sk.add_bone("mixamorig:LeftShoulder", Some(hips), Vector3::new(0.1, 0.5, 0.0), ident());
        sk.add_bone("mixamorig:RightShoulder", Some(hips), Vector3::new(-0.1, 0.5, 0.0), ident());
        let mut rt = Retargeter::bind(sk).unwrap();
        let cfg = RetargetConfig::default();

        rt.update(&world_frame(standing_world()), &cfg);
        let first = *rt.calibration();
        assert!(first.y_calibrated && first.scale_calibrated);
        // リグ肩幅 0.2 / ランドマーク肩幅 0.4
        assert!((first.scale - 0.5).abs() < 1e-5);
        assert_eq!(first.y_sign, 1.0);

        for i in 0..100 {
            let mut world = standing_world();
            let k = 0.5 + i as f32 * 0.03;
            for lm in world.iter_mut() {
                lm.x *= k;
                // 上下反転したフレームも混ぜる
                lm.y *= if i % 2 == 0 { -k } else { k };
            }
            rt.update(&world_frame(world), &cfg);
        }
        assert_eq!(rt.calibration().scale, first.scale);
        assert_eq!(rt.calibration().y_sign, first.y_sign);
    }

    #[test]
    fn test_reset_recalibrates_and_restores_root() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        let mut world = standing_world();
        for lm in world.iter_mut() {
            lm.y = -lm.y;
        }
        rt.update(&world_frame(world), &RetargetConfig::default());
        assert_eq!(rt.calibration().y_sign, -1.0);

        rt.reset();
        let root = rt.root_id();
        assert_eq!(rt.skeleton().bone(root).translation, Vector3::zeros());
        assert!(!rt.calibration().y_calibrated);

        rt.update(&world_frame(standing_world()), &RetargetConfig::default());
        assert_eq!(rt.calibration().y_sign, 1.0);
    }

    #[test]
    fn test_mirror_is_involutive() {
        let cfg_plain = config(0.35, false);
        let cfg_mirror = config(0.35, true);

        let mut plain = Retargeter::bind(humanoid()).unwrap();
        let mut mirrored = Retargeter::bind(humanoid()).unwrap();

        let frame = world_frame(standing_world());
        let mut flipped = standing_world();
        for lm in flipped.iter_mut() {
            lm.x = -lm.x;
        }
        let flipped = world_frame(flipped);

        for _ in 0..5 {
            plain.update(&frame, &cfg_plain);
            mirrored.update(&flipped, &cfg_mirror);
        }

        for ((_, a), (_, b)) in plain.skeleton().iter().zip(mirrored.skeleton().iter()) {
            assert!(approx_eq_quat(&a.rotation, &b.rotation, 1e-5), "bone {}", a.name);
            assert!(approx_eq_vec(&a.translation, &b.translation, 1e-5), "bone {}", a.name);
        }
    }

    #[test]
    fn test_ground_converges_without_overshoot() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        let cfg = config(1.0, false);
        let frame = world_frame(standing_world());

        // 1フレーム目でボーン回転が確定する（slerp=1）
        rt.update(&frame, &cfg);
        let min_y = |rt: &Retargeter| {
            ground::lowest_extremity_y(rt.skeleton(), rt.bone_map()).unwrap()
        };
        let mut gap = min_y(&rt) - cfg.ground_y;

        for _ in 0..15 {
            rt.update(&frame, &cfg);
            let next = min_y(&rt) - cfg.ground_y;
            assert!(next.abs() <= gap.abs() + 1e-6);
            assert!((next.abs() - gap.abs() * 0.5).abs() < 1e-4);
            // 符号が変わらない = 行き過ぎない
            assert!(next * gap >= 0.0);
            gap = next;
        }
        assert!(gap.abs() < 1e-4);
    }

    #[test]
    fn test_recenter_before_rest_only() {
        let mut sk = Skeleton::new();
        let top = sk.add_bone("Root", None, Vector3::zeros(), ident());
        let scene = sk.add_bone("Scene", Some(top), Vector3::zeros(), ident());
        let hips = sk.add_bone("Hips", Some(scene), Vector3::new(0.0, 1.0, 0.2), ident());
        let spine = sk.add_bone("Spine", Some(hips), Vector3::new(0.0, 0.2, 0.0), ident());
        sk.add_bone("Neck", Some(spine), Vector3::new(0.0, 0.3, 0.0), ident());
        let mut rt = Retargeter::bind(sk).unwrap();

        // Hips の親は Scene なのでルートは Scene
        assert_eq!(rt.root_id(), scene);
        assert!(rt.recenter_on_hips());
        assert!(approx_eq_vec(
            &rt.skeleton().world_position(hips),
            &rt.skeleton().world_position(scene),
            1e-6
        ));

        rt.cache_rest();
        assert!(!rt.recenter_on_hips());
    }

    #[test]
    fn test_reset_rest_recaptures() {
        let mut rt = Retargeter::bind(humanoid()).unwrap();
        rt.cache_rest();
        let once = rt.rest_cache().clone();
        rt.cache_rest();
        assert_eq!(rt.rest_cache(), &once);

        rt.reset_rest();
        assert!(!rt.rest_cache().is_captured());
        rt.update(&world_frame(standing_world()), &RetargetConfig::default());
        assert!(rt.rest_cache().is_captured());
        assert_eq!(rt.rest_cache().len(), once.len());
    }
}
