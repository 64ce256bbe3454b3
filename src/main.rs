use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use talava_rig::config::Config;
use talava_rig::pose::PoseFrame;
use talava_rig::retarget::Retargeter;
use talava_rig::rig::Skeleton;
use tracing::{debug, info};

const CONFIG_PATH: &str = "config.toml";

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config_path = std::env::args().nth(1).unwrap_or_else(|| CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path);

    let skeleton = Skeleton::from_json(&config.rig.path)?;
    info!(rig = %config.rig.path, bones = skeleton.len(), "rig loaded");

    let mut retargeter = Retargeter::bind(skeleton)?;
    if config.rig.recenter_hips && retargeter.recenter_on_hips() {
        debug!("hips recentered onto root");
    }
    retargeter.cache_rest();
    info!(
        mapped = retargeter.bone_map().len(),
        rest = retargeter.rest_cache().len(),
        "rig bound"
    );

    let file = File::open(&config.replay.frames_path)
        .with_context(|| format!("Failed to open frames {}", config.replay.frames_path))?;

    let mut frames = 0usize;
    let mut skipped = 0usize;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let frame: PoseFrame = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid frame", config.replay.frames_path, i + 1))?;

        let report = retargeter.update(&frame, &config.retarget);
        if !frame.is_complete() {
            skipped += 1;
        }
        frames += 1;

        if config.replay.log_interval > 0 && frames % config.replay.log_interval == 0 {
            let root = retargeter.skeleton().bone(retargeter.root_id()).translation;
            info!(
                frame = frames,
                t = frame.timestamp,
                root = ?[root.x, root.y, root.z],
                bones = report.bones_updated,
                yaw = report.yaw_updated,
                ground = report.ground_delta,
                "replay"
            );
        }
    }

    let cal = retargeter.calibration();
    let root = retargeter.skeleton().bone(retargeter.root_id());
    info!(
        frames,
        skipped,
        root = ?[root.translation.x, root.translation.y, root.translation.z],
        root_angle = root.rotation.angle().to_degrees(),
        scale = cal.scale,
        y_sign = cal.y_sign,
        "replay finished"
    );
    for (_, bone) in retargeter.skeleton().iter() {
        let (roll, pitch, yaw) = bone.rotation.euler_angles();
        debug!(
            bone = %bone.name,
            roll = roll.to_degrees(),
            pitch = pitch.to_degrees(),
            yaw = yaw.to_degrees(),
            "final pose"
        );
    }
    Ok(())
}
