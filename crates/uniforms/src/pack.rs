//! GPU buffer layout for user uniforms.
//!
//! Mirrors the std140/std430 rules the shader sees for a struct of
//! `float`/`float2`/`float3`/`float4` members: scalars align to 4 bytes,
//! two-component vectors to 8, three- and four-component vectors to 16. A
//! `float3` occupies 12 bytes, so a following scalar packs into its tail. The
//! buffer is padded to a multiple of 16 and is never empty, because wgpu
//! rejects zero-sized uniform bindings.
use shaderschema::ComponentType;

use crate::variable::UniformVariable;

const MIN_BUFFER_SIZE: usize = 16;

pub fn alignment_of(component_type: ComponentType) -> usize {
    match component_type {
        ComponentType::Scalar => 4,
        ComponentType::Vec2 => 8,
        ComponentType::Vec3 | ComponentType::Vec4 => 16,
    }
}

pub fn size_of(component_type: ComponentType) -> usize {
    component_type.component_count() * std::mem::size_of::<f32>()
}

/// Byte offset of every variable plus the padded total size.
pub fn packed_layout(variables: &[UniformVariable]) -> (Vec<usize>, usize) {
    let mut offsets = Vec::with_capacity(variables.len());
    let mut cursor = 0usize;
    for variable in variables {
        let align = alignment_of(variable.component_type);
        cursor = cursor.div_ceil(align) * align;
        offsets.push(cursor);
        cursor += size_of(variable.component_type);
    }
    let total = (cursor.div_ceil(16) * 16).max(MIN_BUFFER_SIZE);
    (offsets, total)
}

pub fn packed_size(variables: &[UniformVariable]) -> usize {
    packed_layout(variables).1
}

/// Writes every value at its aligned offset; padding bytes are zero.
pub(crate) fn pack_into(variables: &[UniformVariable], out: &mut Vec<u8>) {
    let (offsets, total) = packed_layout(variables);
    out.clear();
    out.resize(total, 0);
    for (variable, offset) in variables.iter().zip(offsets) {
        let bytes: &[u8] = bytemuck::cast_slice(variable.values());
        out[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shaderschema::{UniformRange, UniformStyle};

    fn var(name: &str, component_type: ComponentType) -> UniformVariable {
        UniformVariable::new(
            name,
            component_type,
            UniformStyle::Slider,
            UniformRange::new(-10.0, 10.0),
        )
    }

    #[test]
    fn layout_follows_alignment_rules() {
        let vars = vec![
            var("a", ComponentType::Scalar),
            var("b", ComponentType::Vec3),
            var("c", ComponentType::Scalar),
            var("d", ComponentType::Vec2),
            var("e", ComponentType::Vec4),
            var("f", ComponentType::Scalar),
        ];
        let (offsets, total) = packed_layout(&vars);
        assert_eq!(offsets, vec![0, 16, 28, 32, 48, 64]);
        assert_eq!(total, 80);
    }

    #[test]
    fn empty_layout_still_has_a_minimum_size() {
        assert_eq!(packed_size(&[]), 16);
    }

    #[test]
    fn pack_writes_little_endian_floats_at_offsets() {
        let mut a = var("a", ComponentType::Scalar);
        a.assign(&[1.5]);
        let mut b = var("b", ComponentType::Vec2);
        b.assign(&[2.0, -3.0]);
        let mut out = Vec::new();
        pack_into(&[a, b], &mut out);
        assert_eq!(out.len(), 16);
        assert_eq!(&out[0..4], &1.5f32.to_ne_bytes());
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
        assert_eq!(&out[8..12], &2.0f32.to_ne_bytes());
        assert_eq!(&out[12..16], &(-3.0f32).to_ne_bytes());
    }
}
