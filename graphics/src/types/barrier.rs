//! Image layouts and the pipeline stages that guard transitions between them.

use bitflags::bitflags;

/// Layout an image is in at a given point of a command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureLayout {
    /// Contents are discarded.
    #[default]
    Undefined,
    TransferDst,
    ShaderReadOnly,
    ColorAttachment,
    PresentSrc,
}

bitflags! {
    /// Pipeline stages named by barriers.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PipelineStages: u32 {
        const TOP_OF_PIPE = 1 << 0;
        const TRANSFER = 1 << 1;
        const FRAGMENT_SHADER = 1 << 2;
        const COLOR_ATTACHMENT_OUTPUT = 1 << 3;
        const BOTTOM_OF_PIPE = 1 << 4;
        const ALL_COMMANDS = 1 << 5;
    }
}

/// A layout transition together with the stages it synchronizes.
///
/// Work in `src_stages` recorded before the barrier completes before work in
/// `dst_stages` recorded after it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LayoutTransition {
    pub old: TextureLayout,
    pub new: TextureLayout,
    pub src_stages: PipelineStages,
    pub dst_stages: PipelineStages,
}

impl LayoutTransition {
    pub fn new(old: TextureLayout, new: TextureLayout) -> Self {
        use TextureLayout as L;

        let (src_stages, dst_stages) = match (old, new) {
            (L::Undefined, L::TransferDst) => (PipelineStages::TOP_OF_PIPE, PipelineStages::TRANSFER),
            (L::TransferDst, L::ShaderReadOnly) => {
                (PipelineStages::TRANSFER, PipelineStages::FRAGMENT_SHADER)
            }
            // Chained to the acquire semaphore wait at color attachment output.
            (L::Undefined, L::ColorAttachment) => (
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
            ),
            (L::ColorAttachment, L::PresentSrc) => (
                PipelineStages::COLOR_ATTACHMENT_OUTPUT,
                PipelineStages::BOTTOM_OF_PIPE,
            ),
            _ => (PipelineStages::ALL_COMMANDS, PipelineStages::ALL_COMMANDS),
        };

        Self {
            old,
            new,
            src_stages,
            dst_stages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upload_sequence_stages() {
        let to_dst = LayoutTransition::new(TextureLayout::Undefined, TextureLayout::TransferDst);
        assert_eq!(to_dst.src_stages, PipelineStages::TOP_OF_PIPE);
        assert_eq!(to_dst.dst_stages, PipelineStages::TRANSFER);

        let to_read =
            LayoutTransition::new(TextureLayout::TransferDst, TextureLayout::ShaderReadOnly);
        assert_eq!(to_read.src_stages, PipelineStages::TRANSFER);
        assert_eq!(to_read.dst_stages, PipelineStages::FRAGMENT_SHADER);
    }

    #[test]
    fn present_sequence_stages() {
        let to_color =
            LayoutTransition::new(TextureLayout::Undefined, TextureLayout::ColorAttachment);
        assert_eq!(to_color.src_stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(to_color.dst_stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);

        let to_present =
            LayoutTransition::new(TextureLayout::ColorAttachment, TextureLayout::PresentSrc);
        assert_eq!(to_present.src_stages, PipelineStages::COLOR_ATTACHMENT_OUTPUT);
        assert_eq!(to_present.dst_stages, PipelineStages::BOTTOM_OF_PIPE);
    }

    #[test]
    fn unknown_pair_is_conservative() {
        let t = LayoutTransition::new(TextureLayout::ShaderReadOnly, TextureLayout::TransferDst);
        assert_eq!(t.src_stages, PipelineStages::ALL_COMMANDS);
        assert_eq!(t.dst_stages, PipelineStages::ALL_COMMANDS);
    }
}
