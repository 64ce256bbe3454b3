//! ボーン名の正規化
//!
//! "mixamorig:LeftArm" や "RigLeftForearm" のようなリグ固有の名前を
//! リターゲッタが使う正規名 (`LeftUpperArm`, `LeftForeArm`, ...) に揃える。

use std::fmt;

/// リターゲッタが認識する正規ボーン名
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CanonicalBone {
    Hips,
    Spine,
    Spine1,
    Spine2,
    Neck,
    Head,
    LeftShoulder,
    RightShoulder,
    LeftUpperArm,
    RightUpperArm,
    LeftForeArm,
    RightForeArm,
    LeftUpLeg,
    RightUpLeg,
    LeftLeg,
    RightLeg,
    LeftFoot,
    RightFoot,
    LeftToe,
    RightToe,
}

impl CanonicalBone {
    pub const ALL: [CanonicalBone; 20] = [
        Self::Hips,
        Self::Spine,
        Self::Spine1,
        Self::Spine2,
        Self::Neck,
        Self::Head,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftUpperArm,
        Self::RightUpperArm,
        Self::LeftForeArm,
        Self::RightForeArm,
        Self::LeftUpLeg,
        Self::RightUpLeg,
        Self::LeftLeg,
        Self::RightLeg,
        Self::LeftFoot,
        Self::RightFoot,
        Self::LeftToe,
        Self::RightToe,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hips => "Hips",
            Self::Spine => "Spine",
            Self::Spine1 => "Spine1",
            Self::Spine2 => "Spine2",
            Self::Neck => "Neck",
            Self::Head => "Head",
            Self::LeftShoulder => "LeftShoulder",
            Self::RightShoulder => "RightShoulder",
            Self::LeftUpperArm => "LeftUpperArm",
            Self::RightUpperArm => "RightUpperArm",
            Self::LeftForeArm => "LeftForeArm",
            Self::RightForeArm => "RightForeArm",
            Self::LeftUpLeg => "LeftUpLeg",
            Self::RightUpLeg => "RightUpLeg",
            Self::LeftLeg => "LeftLeg",
            Self::RightLeg => "RightLeg",
            Self::LeftFoot => "LeftFoot",
            Self::RightFoot => "RightFoot",
            Self::LeftToe => "LeftToe",
            Self::RightToe => "RightToe",
        }
    }

    /// 正規化済みの名前から引く。未知の名前は追跡対象外なので None。
    pub fn from_canonical(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|b| b.as_str() == name)
    }

    /// 生のボーン名から直接引く
    pub fn from_raw(raw: &str) -> Option<Self> {
        Self::from_canonical(&canonicalize(raw))
    }
}

impl fmt::Display for CanonicalBone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 表記ゆれ → 正規名
const SYNONYMS: &[(&str, CanonicalBone)] = &[
    // Mixamo は上腕を "LeftArm" と呼ぶことがある
    ("LeftArm", CanonicalBone::LeftUpperArm),
    ("RightArm", CanonicalBone::RightUpperArm),
    ("LeftToeBase", CanonicalBone::LeftToe),
    ("RightToeBase", CanonicalBone::RightToe),
];

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

/// 先頭のプレフィックスを1つ剥がす。剥がせなければ None。
fn strip_one_prefix(n: &str) -> Option<&str> {
    // 名前空間 ("mixamorig:") とアーマチュア ("Armature|") は区切りの後ろだけ残す
    if let Some(pos) = n.rfind([':', '|']) {
        return Some(&n[pos + 1..]);
    }
    if let Some(rest) = n.strip_prefix('_') {
        return Some(rest);
    }
    if starts_with_ci(n, "mixamo") {
        return Some(&n["mixamo".len()..]);
    }
    // "RigLeftArm" -> "LeftArm"。"Right..." は剥がさない
    if starts_with_ci(n, "rig") && !starts_with_ci(n, "right") {
        let rest = &n["rig".len()..];
        if rest.starts_with(|c: char| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_') {
            return Some(rest);
        }
    }
    None
}

/// 生のボーン名を正規名に変換する。
///
/// 純粋関数で、決して失敗しない。表にない名前はそのまま（先頭大文字化のみ）返すので、
/// 呼び出し側は「追跡しないボーン」として扱うこと。
/// `canonicalize(&canonicalize(x)) == canonicalize(x)` が常に成り立つ。
pub fn canonicalize(raw: &str) -> String {
    // 大文字化やForeArm補正で新しいプレフィックスが現れることがあるので収束まで回す
    // 各周回は何かを剥がすか、変化なしで止まる
    let mut name = normalize_once(raw);
    loop {
        let next = normalize_once(&name);
        if next == name {
            break;
        }
        name = next;
    }

    match SYNONYMS.iter().find(|(alias, _)| *alias == name) {
        Some((_, bone)) => bone.as_str().to_string(),
        None => name,
    }
}

fn normalize_once(raw: &str) -> String {
    let mut n = raw.trim();
    while let Some(stripped) = strip_one_prefix(n) {
        n = stripped.trim();
    }

    let mut name = fix_forearm(n);

    if let Some(first) = name.chars().next() {
        if !first.is_uppercase() {
            let upper: String = first.to_uppercase().collect();
            name.replace_range(..first.len_utf8(), &upper);
        }
    }
    name
}

/// "forearm" の大文字小文字ゆれを "ForeArm" に揃える（最初の1箇所）
fn fix_forearm(n: &str) -> String {
    const NEEDLE: &str = "forearm";
    let lower = n.to_ascii_lowercase();
    match lower.find(NEEDLE) {
        // ASCII小文字化はバイト位置を変えない
        Some(pos) if n.is_char_boundary(pos) && n.is_char_boundary(pos + NEEDLE.len()) => {
            format!("{}ForeArm{}", &n[..pos], &n[pos + NEEDLE.len()..])
        }
        _ => n.to_string(),
    }
}
