//! CPU-side material data: per-channel decoded images and the set of
//! channels a material actually carries.

use bitflags::bitflags;

bitflags! {
    /// Texture channels present on a material.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialChannels: u32 {
        const ALBEDO = 1 << 0;
        const NORMAL = 1 << 1;
        const METALLIC_ROUGHNESS = 1 << 2;
        const EMISSIVE = 1 << 3;
    }
}

impl MaterialChannels {
    /// Returns `true` if the channel stores color data that should be
    /// sampled through an sRGB format.
    pub fn is_srgb(self) -> bool {
        self == Self::ALBEDO
    }

    /// Short name used for debug labels.
    pub fn label(self) -> &'static str {
        match self {
            Self::ALBEDO => "albedo",
            Self::NORMAL => "normal",
            Self::METALLIC_ROUGHNESS => "metallic_roughness",
            Self::EMISSIVE => "emissive",
            _ => "mixed",
        }
    }
}

/// Decoded image for one material channel.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureData {
    pub width: u32,
    pub height: u32,
    /// Number of 8-bit channels per pixel in `data`.
    pub channels: u32,
    pub data: Vec<u8>,
}

impl TextureData {
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            data,
        }
    }

    /// Creates a `width x height` RGBA8 image filled with one color.
    pub fn solid_rgba(width: u32, height: u32, rgba: [u8; 4]) -> Self {
        let data = rgba
            .iter()
            .copied()
            .cycle()
            .take((width * height * 4) as usize)
            .collect();
        Self::new(width, height, 4, data)
    }

    /// Expected byte length for the declared dimensions.
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.channels as usize
    }

    /// Returns `true` if `data` matches the declared dimensions.
    pub fn is_consistent(&self) -> bool {
        self.width > 0 && self.height > 0 && self.data.len() == self.expected_len()
    }
}

/// Decoded material: the channel set plus one image per present channel.
///
/// Images for channels not in `channels` are ignored on upload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaterialData {
    pub channels: MaterialChannels,
    pub albedo: TextureData,
    pub normal: TextureData,
    pub metallic_roughness: TextureData,
    pub emissive: TextureData,
}

impl MaterialData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the image for `channel` and marks it present.
    ///
    /// `channel` must be a single flag.
    pub fn with_channel(mut self, channel: MaterialChannels, texture: TextureData) -> Self {
        debug_assert_eq!(channel.bits().count_ones(), 1);
        if let Some(slot) = self.slot_mut(channel) {
            *slot = texture;
            self.channels |= channel;
        }
        self
    }

    /// Returns the image for `channel` if the channel is present.
    pub fn channel(&self, channel: MaterialChannels) -> Option<&TextureData> {
        if !self.channels.contains(channel) {
            return None;
        }
        match channel {
            MaterialChannels::ALBEDO => Some(&self.albedo),
            MaterialChannels::NORMAL => Some(&self.normal),
            MaterialChannels::METALLIC_ROUGHNESS => Some(&self.metallic_roughness),
            MaterialChannels::EMISSIVE => Some(&self.emissive),
            _ => None,
        }
    }

    /// Present channels with their images, in flag order.
    pub fn present_channels(&self) -> impl Iterator<Item = (MaterialChannels, &TextureData)> {
        self.channels
            .iter()
            .filter_map(move |flag| self.channel(flag).map(|tex| (flag, tex)))
    }

    fn slot_mut(&mut self, channel: MaterialChannels) -> Option<&mut TextureData> {
        match channel {
            MaterialChannels::ALBEDO => Some(&mut self.albedo),
            MaterialChannels::NORMAL => Some(&mut self.normal),
            MaterialChannels::METALLIC_ROUGHNESS => Some(&mut self.metallic_roughness),
            MaterialChannels::EMISSIVE => Some(&mut self.emissive),
            _ => None,
        }
    }
}
