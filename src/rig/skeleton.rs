use anyhow::{bail, Context, Result};
use nalgebra::{Isometry3, Point3, Quaternion, Translation3, UnitQuaternion, Vector3};
use serde::Deserialize;
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Skeleton 内のボーンハンドル
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BoneId(usize);

impl BoneId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    parent: Option<BoneId>,
    children: Vec<BoneId>,
    /// 親空間での位置
    pub translation: Vector3<f32>,
    /// 親空間での回転
    pub rotation: UnitQuaternion<f32>,
}

impl Bone {
    pub fn parent(&self) -> Option<BoneId> {
        self.parent
    }

    pub fn children(&self) -> &[BoneId] {
        &self.children
    }

    fn local_isometry(&self) -> Isometry3<f32> {
        Isometry3::from_parts(Translation3::from(self.translation), self.rotation)
    }
}

/// ボーン階層。親は必ず子より先に追加される。
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
}

// --- JSON ---

#[derive(Deserialize)]
struct JsonSkeleton {
    bones: Vec<JsonBone>,
}

#[derive(Deserialize)]
struct JsonBone {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    translation: [f32; 3],
    /// (x, y, z, w)
    #[serde(default = "identity_rotation")]
    rotation: [f32; 4],
}

fn identity_rotation() -> [f32; 4] {
    [0.0, 0.0, 0.0, 1.0]
}

impl Skeleton {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read rig file {}", path.display()))?;
        Self::from_json_str(&content)
            .with_context(|| format!("Failed to parse rig file {}", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw: JsonSkeleton = serde_json::from_str(json)?;

        let mut skeleton = Self::new();
        let mut ids: HashMap<String, BoneId> = HashMap::new();
        for b in raw.bones {
            let parent = match &b.parent {
                Some(p) => match ids.get(p) {
                    Some(&id) => Some(id),
                    None => bail!("bone '{}' references unknown or later parent '{}'", b.name, p),
                },
                None => None,
            };
            let [x, y, z, w] = b.rotation;
            let q = Quaternion::new(w, x, y, z);
            let rotation = match UnitQuaternion::try_new(q, 1e-6) {
                Some(r) if q.coords.iter().all(|c| c.is_finite()) => r,
                _ => bail!("bone '{}' has invalid rotation {:?}", b.name, b.rotation),
            };
            let id = skeleton.add_bone(&b.name, parent, Vector3::from(b.translation), rotation);
            // 同名ボーンは最初のものを名前解決に使う
            ids.entry(b.name).or_insert(id);
        }
        Ok(skeleton)
    }

    /// ボーンを追加して新しいハンドルを返す
    pub fn add_bone(
        &mut self,
        name: &str,
        parent: Option<BoneId>,
        translation: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
    ) -> BoneId {
        let id = BoneId(self.bones.len());
        self.bones.push(Bone {
            name: name.to_string(),
            parent,
            children: Vec::new(),
            translation,
            rotation,
        });
        if let Some(p) = parent {
            self.bones[p.0].children.push(id);
        }
        id
    }

    pub fn len(&self) -> usize {
        self.bones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bones.is_empty()
    }

    pub fn bone(&self, id: BoneId) -> &Bone {
        &self.bones[id.0]
    }

    pub fn bone_mut(&mut self, id: BoneId) -> &mut Bone {
        &mut self.bones[id.0]
    }

    pub fn iter(&self) -> impl Iterator<Item = (BoneId, &Bone)> {
        self.bones.iter().enumerate().map(|(i, b)| (BoneId(i), b))
    }

    pub fn find(&self, name: &str) -> Option<BoneId> {
        self.iter().find(|(_, b)| b.name == name).map(|(id, _)| id)
    }

    /// 親を持たないノード
    pub fn roots(&self) -> Vec<BoneId> {
        self.iter()
            .filter(|(_, b)| b.parent.is_none())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn parent(&self, id: BoneId) -> Option<BoneId> {
        self.bones[id.0].parent
    }

    pub fn first_child(&self, id: BoneId) -> Option<BoneId> {
        self.bones[id.0].children.first().copied()
    }

    /// 親を辿ってワールド変換を合成
    pub fn world_transform(&self, id: BoneId) -> Isometry3<f32> {
        let bone = &self.bones[id.0];
        let local = bone.local_isometry();
        match bone.parent {
            Some(p) => self.world_transform(p) * local,
            None => local,
        }
    }

    pub fn world_position(&self, id: BoneId) -> Vector3<f32> {
        self.world_transform(id).translation.vector
    }

    pub fn world_rotation(&self, id: BoneId) -> UnitQuaternion<f32> {
        self.world_transform(id).rotation
    }

    /// `pivot` のワールド位置が `root` の原点に来るよう、root直下の子を平行移動する
    pub fn recenter(&mut self, root: BoneId, pivot: BoneId) {
        let root_world = self.world_transform(root);
        let pivot_world = Point3::from(self.world_position(pivot));
        let offset = root_world.inverse_transform_point(&pivot_world).coords;

        let children = self.bones[root.0].children.clone();
        for child in children {
            self.bones[child.0].translation -= offset;
        }
    }
}
