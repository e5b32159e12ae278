// ============================================================================
// CHANNEL SETS — the five derived rasters and the names they are exported by
// ============================================================================

use image::GrayImage;

/// Number of derived channels per stage.
pub const CHANNEL_COUNT: usize = 5;

/// One of the five single-intensity rasters derived from the source photo.
/// Declaration order is the display / export order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Channel {
    Grayscale,
    Green,
    Red,
    Blue,
    GrayNoGreen,
}

impl Channel {
    pub const ALL: [Channel; CHANNEL_COUNT] = [
        Channel::Grayscale,
        Channel::Green,
        Channel::Red,
        Channel::Blue,
        Channel::GrayNoGreen,
    ];

    pub fn index(self) -> usize {
        match self {
            Channel::Grayscale => 0,
            Channel::Green => 1,
            Channel::Red => 2,
            Channel::Blue => 3,
            Channel::GrayNoGreen => 4,
        }
    }

    /// Base title shown under the derived image.
    pub fn title(self) -> &'static str {
        match self {
            Channel::Grayscale => "Grayscale",
            Channel::Green => "Green Channel",
            Channel::Red => "Red Channel",
            Channel::Blue => "Blue Channel",
            Channel::GrayNoGreen => "Grayscale No Green",
        }
    }

    /// Name used in the normalized and stretched titles ("Green Normalized").
    pub fn short_title(self) -> &'static str {
        match self {
            Channel::Grayscale => "Grayscale",
            Channel::Green => "Green",
            Channel::Red => "Red",
            Channel::Blue => "Blue",
            Channel::GrayNoGreen => "Grayscale No Green",
        }
    }

    /// Depends on the red/blue weights.
    pub fn is_weighted(self) -> bool {
        self == Channel::GrayNoGreen
    }

    /// Parse a short CLI name (`gray`, `green`, `red`, `blue`, `nogreen`).
    pub fn from_name(name: &str) -> Option<Channel> {
        match name.to_lowercase().as_str() {
            "gray" | "grey" | "grayscale" => Some(Channel::Grayscale),
            "green" | "g" => Some(Channel::Green),
            "red" | "r" => Some(Channel::Red),
            "blue" | "b" => Some(Channel::Blue),
            "nogreen" | "gray-no-green" | "graynogreen" => Some(Channel::GrayNoGreen),
            _ => None,
        }
    }
}

/// Processing stage a raster belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    /// Straight out of the channel extractor.
    Derived,
    /// After autocontrast.
    Normalized,
    /// After the two-threshold contrast stretch.
    Stretched,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Derived, Stage::Normalized, Stage::Stretched];

    pub fn index(self) -> usize {
        match self {
            Stage::Derived => 0,
            Stage::Normalized => 1,
            Stage::Stretched => 2,
        }
    }

    pub fn from_name(name: &str) -> Option<Stage> {
        match name.to_lowercase().as_str() {
            "derived" | "raw" | "original" => Some(Stage::Derived),
            "normalized" | "norm" => Some(Stage::Normalized),
            "stretched" | "stretch" | "custom" => Some(Stage::Stretched),
            _ => None,
        }
    }
}

/// Names one of the 15 rasters a session can produce.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ImageKey {
    pub channel: Channel,
    pub stage: Stage,
}

impl ImageKey {
    pub const fn new(channel: Channel, stage: Stage) -> Self {
        Self { channel, stage }
    }

    /// Every key, stage-major (all derived images first).
    pub fn all() -> impl Iterator<Item = ImageKey> {
        Stage::ALL
            .into_iter()
            .flat_map(|stage| Channel::ALL.into_iter().map(move |channel| ImageKey::new(channel, stage)))
    }

    /// Bit position inside a [`crate::session::Dirty`] mask.
    pub(crate) fn bit(self) -> u16 {
        1 << (self.stage.index() * CHANNEL_COUNT + self.channel.index())
    }

    /// Display title: "Red Channel", "Red Normalized", "Red Custom Stretch".
    pub fn title(self) -> String {
        match self.stage {
            Stage::Derived => self.channel.title().to_string(),
            Stage::Normalized => format!("{} Normalized", self.channel.short_title()),
            Stage::Stretched => format!("{} Custom Stretch", self.channel.short_title()),
        }
    }

    /// Default export file name.
    ///
    /// The title with spaces removed; images that depend on the red/blue
    /// weights also carry them, e.g. `GrayscaleNoGreen_R0.50_B0.50.png`.
    pub fn default_file_name(self, red_weight: f32, blue_weight: f32, extension: &str) -> String {
        let stem: String = self.title().chars().filter(|c| !c.is_whitespace()).collect();
        if self.channel.is_weighted() {
            format!("{}_R{:.2}_B{:.2}.{}", stem, red_weight, blue_weight, extension)
        } else {
            format!("{}.{}", stem, extension)
        }
    }
}

/// Five rasters of one stage, indexed by [`Channel`].
/// All members share the dimensions of the source they were derived from.
#[derive(Clone, Debug, PartialEq)]
pub struct ChannelSet {
    images: [GrayImage; CHANNEL_COUNT],
}

impl ChannelSet {
    pub fn from_array(images: [GrayImage; CHANNEL_COUNT]) -> Self {
        Self { images }
    }

    pub fn get(&self, channel: Channel) -> &GrayImage {
        &self.images[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, image: GrayImage) {
        self.images[channel.index()] = image;
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.images[0].dimensions()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, &GrayImage)> {
        Channel::ALL.into_iter().zip(self.images.iter())
    }

    /// Build a new set by applying `f` to every member.
    pub fn map<F>(&self, f: F) -> ChannelSet
    where
        F: Fn(&GrayImage) -> GrayImage,
    {
        ChannelSet {
            images: [
                f(&self.images[0]),
                f(&self.images[1]),
                f(&self.images[2]),
                f(&self.images[3]),
                f(&self.images[4]),
            ],
        }
    }
}
