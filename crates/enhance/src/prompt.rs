pub const MODEL: &str = "dall-e-2";
pub const OUTPUT_COUNT: u8 = 1;
pub const OUTPUT_SIZE: &str = "1024x1024";

pub const ENHANCE_PROMPT: &str = "Transform this satellite image into a bright, high-resolution \
aerial drone photograph of the same parcel of land. Keep the exact property boundaries, roads, \
tree lines, water and structures where they are. Improve clarity, color and lighting so it looks \
like a clear sunny day. Do not add buildings, text, labels or people.";
