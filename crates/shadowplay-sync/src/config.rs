//! Coordinator configuration.

use shadowplay_protocol::{PeerId, DEFAULT_INPUT_PROPERTY, DEFAULT_TARGET_PROPERTY};

/// Configuration for one peer's shadow coordinator.
///
/// The target property is the top-level key of the remote document the
/// coordinator reconciles; the input property is the sub-key inside it
/// that carries player input. Both default to the wire names the
/// devices use.
#[derive(Debug, Clone)]
pub struct ShadowConfig {
    /// The peer (remote document) this coordinator owns.
    pub peer: PeerId,
    /// Top-level property under `state.desired` / `state.reported`.
    pub target_property: String,
    /// Input sub-property of the target property.
    pub input_property: String,
}

impl ShadowConfig {
    /// Creates a configuration with the default property names.
    pub fn new(peer: PeerId) -> Self {
        Self {
            peer,
            target_property: DEFAULT_TARGET_PROPERTY.to_string(),
            input_property: DEFAULT_INPUT_PROPERTY.to_string(),
        }
    }

    /// Overrides the target property.
    pub fn target_property(mut self, property: impl Into<String>) -> Self {
        self.target_property = property.into();
        self
    }

    /// Overrides the input sub-property.
    pub fn input_property(mut self, property: impl Into<String>) -> Self {
        self.input_property = property.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_wire_names() {
        let config = ShadowConfig::new(PeerId::new("device-1"));
        assert_eq!(config.target_property, "GameData");
        assert_eq!(config.input_property, "PlayerInput");
    }

    #[test]
    fn test_property_overrides() {
        let config = ShadowConfig::new(PeerId::new("device-1"))
            .target_property("Custom")
            .input_property("Button");
        assert_eq!(config.target_property, "Custom");
        assert_eq!(config.input_property, "Button");
    }
}
