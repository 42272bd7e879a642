use serde::{Deserialize, Serialize};

/// Surface block kinds that matter for the top-down map
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Default, Serialize, Deserialize)]
pub enum BlockType {
    #[default]
    Air,
    Grass,
    Dirt,
    Stone,
    Sand,
    Water,
    Leaves,
    Bedrock,
    Snow,
    Gravel,
    Clay,
    Ice,
}

impl BlockType {
    /// Base map colour (sRGB)
    pub fn map_color(&self) -> [u8; 3] {
        match self {
            BlockType::Air => [0, 0, 0],
            BlockType::Grass => [92, 179, 71],
            BlockType::Dirt => [133, 94, 66],
            BlockType::Stone => [140, 140, 140],
            BlockType::Sand => [227, 212, 156],
            BlockType::Water => [64, 117, 209],
            BlockType::Leaves => [77, 153, 51],
            BlockType::Bedrock => [51, 51, 51],
            BlockType::Snow => [242, 242, 250],
            BlockType::Gravel => [128, 128, 133],
            BlockType::Clay => [166, 166, 184],
            BlockType::Ice => [179, 217, 242],
        }
    }

    pub fn is_liquid(&self) -> bool {
        matches!(self, BlockType::Water)
    }

    /// Fully transparent on the map
    pub fn is_void(&self) -> bool {
        *self == BlockType::Air
    }
}
