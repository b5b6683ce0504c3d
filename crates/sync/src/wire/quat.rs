use glam::Quat;

/// Multiplier applied to the three transmitted components. Keeps four
/// decimal digits through the 16-bit conversion.
const FIXED_POINT: f32 = 10_000.0;

const APPROX_ONE: f32 = 1e-6;

/// Indices 4..=7 mean the rotation is a plain basis quaternion and no
/// component payload follows on the wire.
pub fn is_basis_index(index: u8) -> bool {
    (4..=7).contains(&index)
}

/// Smallest-three compression. Returns the index of the omitted (largest)
/// component and the remaining three components as fixed-point integers.
///
/// `q` and `-q` describe the same rotation, so the whole quaternion is
/// negated when the largest component is negative and its sign is never
/// transmitted.
pub fn compress(rotation: Quat) -> (u8, i16, i16, i16) {
    let elements = rotation.to_array();

    let mut largest_index = 0usize;
    let mut largest_abs = f32::MIN;
    let mut sign = 1.0f32;
    for (i, &element) in elements.iter().enumerate() {
        let abs = element.abs();
        if abs > largest_abs {
            sign = if element < 0.0 { -1.0 } else { 1.0 };
            largest_index = i;
            largest_abs = abs;
        }
    }

    // All other components must be zero when the largest is one, so the
    // index alone can carry the whole rotation.
    if (largest_abs - 1.0).abs() <= APPROX_ONE {
        return ((largest_index + 4) as u8, 0, 0, 0);
    }

    let mut packed = [0i16; 3];
    let mut slot = 0;
    for (i, &element) in elements.iter().enumerate() {
        if i == largest_index {
            continue;
        }
        packed[slot] = pack(element * sign);
        slot += 1;
    }

    (largest_index as u8, packed[0], packed[1], packed[2])
}

/// Rebuilds a rotation from `compress` output. The omitted component is
/// recovered from the unit-length constraint; the argument of the square
/// root is clamped at zero to absorb fixed-point error, and the result is
/// re-normalized so callers always get a unit quaternion back.
pub fn decompress(index: u8, a: i16, b: i16, c: i16) -> Quat {
    if is_basis_index(index) {
        let mut elements = [0.0f32; 4];
        elements[(index - 4) as usize] = 1.0;
        return Quat::from_array(elements);
    }

    let ra = f32::from(a) / FIXED_POINT;
    let rb = f32::from(b) / FIXED_POINT;
    let rc = f32::from(c) / FIXED_POINT;
    let rd = (1.0 - (ra * ra + rb * rb + rc * rc)).max(0.0).sqrt();

    let rotation = match index {
        0 => Quat::from_xyzw(rd, ra, rb, rc),
        1 => Quat::from_xyzw(ra, rd, rb, rc),
        2 => Quat::from_xyzw(ra, rb, rd, rc),
        _ => Quat::from_xyzw(ra, rb, rc, rd),
    };

    rotation.normalize()
}

fn pack(value: f32) -> i16 {
    (value * FIXED_POINT)
        .round()
        .clamp(f32::from(i16::MIN), f32::from(i16::MAX)) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    fn angle_degrees(a: Quat, b: Quat) -> f32 {
        a.angle_between(b).to_degrees()
    }

    #[test]
    fn identity_uses_index_only() {
        let (index, a, b, c) = compress(Quat::IDENTITY);
        assert_eq!(index, 7);
        assert_eq!((a, b, c), (0, 0, 0));
        assert_eq!(decompress(index, 0, 0, 0), Quat::IDENTITY);
    }

    #[test]
    fn basis_rotations_roundtrip_exactly() {
        for slot in 0..4 {
            let mut elements = [0.0f32; 4];
            elements[slot] = 1.0;
            let rotation = Quat::from_array(elements);

            let (index, a, b, c) = compress(rotation);
            assert!(is_basis_index(index));
            let restored = decompress(index, a, b, c);
            assert_eq!(restored, rotation);
        }
    }

    #[test]
    fn negated_basis_decodes_to_same_rotation() {
        let rotation = Quat::from_xyzw(0.0, 0.0, 0.0, -1.0);
        let (index, a, b, c) = compress(rotation);
        assert!(is_basis_index(index));
        let restored = decompress(index, a, b, c);
        assert!(angle_degrees(restored, rotation) < 1e-3);
    }

    #[test]
    fn axis_quarter_turns_roundtrip() {
        let rotations = [
            Quat::from_rotation_x(FRAC_PI_2),
            Quat::from_rotation_y(FRAC_PI_2),
            Quat::from_rotation_z(FRAC_PI_2),
            Quat::from_rotation_x(-FRAC_PI_2),
        ];
        for rotation in rotations {
            let (index, a, b, c) = compress(rotation);
            let restored = decompress(index, a, b, c);
            assert!(angle_degrees(restored, rotation) < 0.05);
        }
    }

    #[test]
    fn arbitrary_rotations_within_one_degree() {
        let rotations = [
            Quat::from_euler(glam::EulerRot::YXZ, 0.3, -1.2, 2.5),
            Quat::from_euler(glam::EulerRot::YXZ, -2.9, 0.01, 0.7),
            Quat::from_euler(glam::EulerRot::YXZ, FRAC_PI_4, FRAC_PI_4, -FRAC_PI_4),
            Quat::from_rotation_y(3.1),
        ];
        for rotation in rotations {
            let (index, a, b, c) = compress(rotation);
            let restored = decompress(index, a, b, c);
            assert!(
                angle_degrees(restored, rotation) < 1.0,
                "rotation {rotation:?} drifted {} degrees",
                angle_degrees(restored, rotation)
            );
        }
    }

    #[test]
    fn negative_largest_component_is_sign_normalized() {
        let rotation = -Quat::from_euler(glam::EulerRot::YXZ, 0.4, 0.8, -0.2);
        let (index, a, b, c) = compress(rotation);
        let restored = decompress(index, a, b, c);
        // Same rotation even though every component flipped sign.
        assert!(angle_degrees(restored, rotation) < 1.0);
    }

    #[test]
    fn decompressed_quaternions_are_unit_length() {
        let rotation = Quat::from_euler(glam::EulerRot::YXZ, 1.1, 0.6, -2.2);
        let (index, a, b, c) = compress(rotation);
        let restored = decompress(index, a, b, c);
        assert!((restored.length() - 1.0).abs() < 1e-6);
    }
}
