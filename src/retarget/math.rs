use nalgebra::{Quaternion, UnitQuaternion, Vector3};

/// `from` を `to` に重ねる最短回転（両方とも単位ベクトル）
///
/// 逆向きの場合は `from` に直交する任意の軸まわりの180度回転を返す。
pub fn rotation_between(from: &Vector3<f32>, to: &Vector3<f32>) -> UnitQuaternion<f32> {
    let r = from.dot(to) + 1.0;

    if r < 1e-6 {
        // 逆向き: 直交軸を選ぶ
        let axis = if from.x.abs() > from.z.abs() {
            Vector3::new(-from.y, from.x, 0.0)
        } else {
            Vector3::new(0.0, -from.z, from.y)
        };
        return UnitQuaternion::from_quaternion(Quaternion::new(0.0, axis.x, axis.y, axis.z));
    }

    let c = from.cross(to);
    UnitQuaternion::from_quaternion(Quaternion::new(r, c.x, c.y, c.z))
}

/// `current` から `target` へ t だけ球面補間する。t >= 1 は target をそのまま返す。
/// slerp が定義できない（ほぼ同一）場合は最短経路の nlerp に落とす。
/// f32 の slerp は小角度でノルムがずれるので、補間結果は正規化し直す。
pub fn slerp_toward(
    current: &UnitQuaternion<f32>,
    target: &UnitQuaternion<f32>,
    t: f32,
) -> UnitQuaternion<f32> {
    if t >= 1.0 {
        return *target;
    }
    if t <= 0.0 {
        return *current;
    }
    let q = current
        .try_slerp(target, t, 1e-6)
        .unwrap_or_else(|| nlerp(current, target, t));
    renormalize(&q)
}

/// 積や補間で蓄積したノルム誤差を落とす
pub fn renormalize(q: &UnitQuaternion<f32>) -> UnitQuaternion<f32> {
    UnitQuaternion::new_normalize(q.into_inner())
}

fn nlerp(a: &UnitQuaternion<f32>, b: &UnitQuaternion<f32>, t: f32) -> UnitQuaternion<f32> {
    // shortest path: dot < 0 なら b を反転
    let sign = if a.coords.dot(&b.coords) < 0.0 { -1.0 } else { 1.0 };
    let coords = a.coords * (1.0 - t) + b.coords * (t * sign);
    UnitQuaternion::from_quaternion(Quaternion::from(coords))
}
