//! Machine configuration: model, chipset generation, video region, and the
//! tagged `(id, value)` config surface used by the command channel.

pub use commodore_denise_ocs::{NTSC_RASTER_FB_HEIGHT, PAL_RASTER_FB_HEIGHT, RASTER_FB_WIDTH};

/// Supported machine models.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmigaModel {
    A500,
    A500Plus,
}

/// Chipset generation. Determines register width, sprite/bitplane fetch
/// width, and which extended custom registers are decoded.
///
/// AGA is not modeled: this core targets OCS and ECS only (see crate-level
/// non-goals).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmigaChipset {
    Ocs,
    Ecs,
}

impl AmigaChipset {
    /// True for ECS, i.e. the chipset with the extended beam-control and
    /// bitplane-modulo registers.
    #[must_use]
    pub const fn is_ecs(self) -> bool {
        matches!(self, Self::Ecs)
    }
}

/// Video timing region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AmigaRegion {
    Pal,
    Ntsc,
}

impl AmigaRegion {
    /// Number of display lines in one frame.
    #[must_use]
    pub const fn lines_per_frame(self) -> u16 {
        match self {
            Self::Pal => 312,
            Self::Ntsc => 262,
        }
    }
}

/// Full machine configuration passed to [`crate::Amiga::new_with_config`].
#[derive(Debug, Clone)]
pub struct AmigaConfig {
    pub model: AmigaModel,
    pub chipset: AmigaChipset,
    pub region: AmigaRegion,
    pub kickstart: Vec<u8>,
    pub slow_ram_size: usize,
}

impl AmigaConfig {
    /// A preset configuration for `model`, matching its stock chipset,
    /// region, and RAM layout as shipped.
    #[must_use]
    pub fn preset(model: AmigaModel, kickstart: Vec<u8>) -> Self {
        let chipset = match model {
            AmigaModel::A500 => AmigaChipset::Ocs,
            AmigaModel::A500Plus => AmigaChipset::Ecs,
        };
        Self {
            model,
            chipset,
            region: AmigaRegion::Pal,
            kickstart,
            slow_ram_size: 0,
        }
    }
}

/// A single named, taggable configuration value exposed over the command
/// channel (see [`crate::message`]). Only a handful of settings are
/// reconfigurable after construction; everything else requires a fresh
/// [`AmigaConfig`] and a new machine.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    Bool(bool),
    Int(i64),
    Text(String),
}

/// A `(id, value)` pair describing one piece of runtime-settable
/// configuration, e.g. `("region", ConfigValue::Text("ntsc".into()))`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigOption {
    pub id: String,
    pub value: ConfigValue,
}

impl ConfigOption {
    #[must_use]
    pub fn new(id: impl Into<String>, value: ConfigValue) -> Self {
        Self {
            id: id.into(),
            value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AmigaChipset, AmigaModel, AmigaRegion};

    #[test]
    fn a500_preset_uses_ocs() {
        let config = super::AmigaConfig::preset(AmigaModel::A500, vec![0; 8]);
        assert_eq!(config.chipset, AmigaChipset::Ocs);
        assert_eq!(config.region, AmigaRegion::Pal);
    }

    #[test]
    fn a500_plus_preset_uses_ecs() {
        let config = super::AmigaConfig::preset(AmigaModel::A500Plus, vec![0; 8]);
        assert!(config.chipset.is_ecs());
    }

    #[test]
    fn chipset_is_ecs_excludes_ocs() {
        assert!(!AmigaChipset::Ocs.is_ecs());
        assert!(AmigaChipset::Ecs.is_ecs());
    }

    #[test]
    fn region_line_counts() {
        assert_eq!(AmigaRegion::Pal.lines_per_frame(), 312);
        assert_eq!(AmigaRegion::Ntsc.lines_per_frame(), 262);
    }
}
