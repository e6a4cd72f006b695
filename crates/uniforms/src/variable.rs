use shaderschema::{ComponentType, UniformRange, UniformStyle};

/// A declared uniform and its current value.
///
/// `values()` always has exactly `component_type.component_count()` entries,
/// each inside `range`.
#[derive(Debug, Clone, PartialEq)]
pub struct UniformVariable {
    pub name: String,
    pub component_type: ComponentType,
    pub style: UniformStyle,
    pub range: UniformRange,
    pub active: bool,
    storage: [f32; 4],
}

impl UniformVariable {
    pub fn new(
        name: impl Into<String>,
        component_type: ComponentType,
        style: UniformStyle,
        range: UniformRange,
    ) -> Self {
        let default = range.clamp(0.0);
        Self {
            name: name.into(),
            component_type,
            style,
            range,
            active: false,
            storage: [default; 4],
        }
    }

    pub fn values(&self) -> &[f32] {
        &self.storage[..self.component_type.component_count()]
    }

    /// Clamps and stores `values`, truncating extras and padding missing
    /// components with the clamped default.
    pub(crate) fn assign(&mut self, values: &[f32]) {
        let default = self.range.clamp(0.0);
        for (index, slot) in self.storage.iter_mut().enumerate() {
            *slot = if index < self.component_type.component_count() {
                values
                    .get(index)
                    .map(|value| self.range.clamp(*value))
                    .unwrap_or(default)
            } else {
                default
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_value_is_zero_clamped_into_range() {
        let var = UniformVariable::new(
            "speed",
            ComponentType::Vec2,
            UniformStyle::Slider,
            UniformRange::new(0.5, 2.0),
        );
        assert_eq!(var.values(), &[0.5, 0.5]);
    }

    #[test]
    fn assign_clamps_truncates_and_pads() {
        let mut var = UniformVariable::new(
            "tint",
            ComponentType::Vec3,
            UniformStyle::Slider,
            UniformRange::new(-1.0, 1.0),
        );
        var.assign(&[5.0, -3.0, 0.25, 9.0]);
        assert_eq!(var.values(), &[1.0, -1.0, 0.25]);
        var.assign(&[0.5]);
        assert_eq!(var.values(), &[0.5, 0.0, 0.0]);
        var.assign(&[f32::NAN, 0.1, 0.2]);
        assert_eq!(var.values(), &[-1.0, 0.1, 0.2]);
    }
}
