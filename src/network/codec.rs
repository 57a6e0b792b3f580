// Float bit-cast codec
// Chat text only carries decimal integers, so floats travel as their raw IEEE-754 bits

use glam::{Vec2, Vec3};

/// Reinterpret the bits of an `f32` as an `i32`
#[inline]
pub fn encode_f32(value: f32) -> i32 {
    value.to_bits() as i32
}

/// Inverse of [`encode_f32`]; exact for every bit pattern
#[inline]
pub fn decode_f32(bits: i32) -> f32 {
    f32::from_bits(bits as u32)
}

pub fn encode_vec2(v: Vec2) -> [i32; 2] {
    [encode_f32(v.x), encode_f32(v.y)]
}

pub fn decode_vec2(bits: [i32; 2]) -> Vec2 {
    Vec2::new(decode_f32(bits[0]), decode_f32(bits[1]))
}

pub fn encode_vec3(v: Vec3) -> [i32; 3] {
    [encode_f32(v.x), encode_f32(v.y), encode_f32(v.z)]
}

pub fn decode_vec3(bits: [i32; 3]) -> Vec3 {
    Vec3::new(decode_f32(bits[0]), decode_f32(bits[1]), decode_f32(bits[2]))
}
