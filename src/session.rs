//! Session — the single loaded photo plus every raster derived from it.
//!
//! A [`Session`] owns the source image, the red/blue weights and the stretch
//! parameters, and keeps the three derived stages (extracted, normalized,
//! stretched) in sync with them. Every setter recomputes only the rasters
//! its parameter feeds and reports them back as an [`Update`], so a viewer
//! can refresh exactly those images.
//!
//! Before a photo is loaded every setter still records its value but
//! computes nothing and returns an empty [`Update`].

use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};

use crate::channels::{Channel, ChannelSet, ImageKey, Stage};
use crate::io::{self, ExportOptions, ImageIoError, SaveFormat};
use crate::ops::adjustments::{autocontrast, stretch_with};
use crate::ops::extract::{extract_channel, extract_channels, invert_rgb};
use crate::params::{StretchParams, Weights, clamp_weight};
use crate::{log_info, log_warn};

// ============================================================================
// UPDATE REPORTING
// ============================================================================

/// Set of derived rasters recomputed by one call.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Dirty(u16);

impl Dirty {
    pub const NONE: Dirty = Dirty(0);
    pub const ALL: Dirty = Dirty(0x7FFF);

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, key: ImageKey) -> bool {
        self.0 & key.bit() != 0
    }

    pub fn insert(&mut self, key: ImageKey) {
        self.0 |= key.bit();
    }

    pub fn union(self, other: Dirty) -> Dirty {
        Dirty(self.0 | other.0)
    }

    pub fn len(&self) -> usize {
        self.0.count_ones() as usize
    }

    /// Every stage of one channel.
    pub fn channel(channel: Channel) -> Dirty {
        let mut d = Dirty::NONE;
        for stage in Stage::ALL {
            d.insert(ImageKey::new(channel, stage));
        }
        d
    }

    /// Every channel of one stage.
    pub fn stage(stage: Stage) -> Dirty {
        let mut d = Dirty::NONE;
        for channel in Channel::ALL {
            d.insert(ImageKey::new(channel, stage));
        }
        d
    }

    pub fn iter(&self) -> impl Iterator<Item = ImageKey> + '_ {
        ImageKey::all().filter(move |k| self.contains(*k))
    }
}

/// Non-blocking notices raised while applying parameters.
#[derive(Clone, Debug, PartialEq)]
pub enum Advisory {
    /// red + blue weight exceeds 1.0; bright pixels will clip at 255.
    WeightSumExceedsOne { red: f32, blue: f32 },
    /// The upper threshold was at or below the lower one and has been raised.
    UpperThresholdRaised { lower: u8, requested: u8, upper: u8 },
}

impl std::fmt::Display for Advisory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Advisory::WeightSumExceedsOne { red, blue } => write!(
                f,
                "red weight {:.2} + blue weight {:.2} = {:.2} exceeds 1.0; bright pixels will clip",
                red,
                blue,
                red + blue
            ),
            Advisory::UpperThresholdRaised { lower, requested, upper } => write!(
                f,
                "upper threshold {} must exceed lower threshold {}; using {}",
                requested, lower, upper
            ),
        }
    }
}

/// Outcome of a parameter change.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub dirty: Dirty,
    pub advisories: Vec<Advisory>,
}

impl Update {
    fn merge(mut self, other: Update) -> Update {
        self.dirty = self.dirty.union(other.dirty);
        self.advisories.extend(other.advisories);
        self
    }
}

/// Rendering collaborator fed by [`Session::publish`].
pub trait SessionObserver {
    /// A derived raster was (re)computed.
    fn image_changed(&mut self, key: ImageKey, image: &GrayImage);

    /// An advisory was raised.
    fn advisory(&mut self, _advisory: &Advisory) {}
}

// ============================================================================
// ERRORS
// ============================================================================

/// Error type for session operations that need a loaded photo
#[derive(Debug)]
pub enum SessionError {
    NoImageLoaded,
    Io(ImageIoError),
}

impl std::fmt::Display for SessionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionError::NoImageLoaded => write!(f, "no image loaded"),
            SessionError::Io(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SessionError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SessionError::NoImageLoaded => None,
            SessionError::Io(e) => Some(e),
        }
    }
}

impl From<ImageIoError> for SessionError {
    fn from(e: ImageIoError) -> Self {
        SessionError::Io(e)
    }
}

// ============================================================================
// SESSION
// ============================================================================

struct Derived {
    /// Source after the optional tonal inversion; what the extractor sees.
    working: RgbImage,
    channels: ChannelSet,
    normalized: ChannelSet,
    stretched: ChannelSet,
}

/// Single loaded photo and its derived rasters.
pub struct Session {
    source: Option<RgbImage>,
    path: Option<PathBuf>,
    weights: Weights,
    stretch: StretchParams,
    invert_source: bool,
    derived: Option<Derived>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            source: None,
            path: None,
            weights: Weights::default(),
            stretch: StretchParams::default(),
            invert_source: false,
            derived: None,
        }
    }

    // -- Loading ---------------------------------------------------------

    /// Decode `path` and make it the current photo.
    ///
    /// On failure the previous photo (if any) and all derived rasters are
    /// left untouched.
    pub fn load(&mut self, path: &Path) -> Result<Update, ImageIoError> {
        let img = io::load_source_image(path)?;
        log_info!("Loaded {} ({}x{})", path.display(), img.width(), img.height());
        let update = self.set_source(img);
        self.path = Some(path.to_path_buf());
        Ok(update)
    }

    /// Replace the current photo with an in-memory raster and recompute
    /// everything.
    pub fn set_source(&mut self, image: RgbImage) -> Update {
        self.path = None;
        self.source = Some(image);
        self.rebuild_all();
        self.full_update()
    }

    pub fn is_loaded(&self) -> bool {
        self.source.is_some()
    }

    pub fn source(&self) -> Option<&RgbImage> {
        self.source.as_ref()
    }

    /// File the current photo was loaded from. `None` for in-memory sources.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // -- Accessors -------------------------------------------------------

    pub fn weights(&self) -> Weights {
        self.weights
    }

    pub fn stretch_params(&self) -> StretchParams {
        self.stretch
    }

    pub fn invert_source(&self) -> bool {
        self.invert_source
    }

    /// All five rasters of `stage`, or `None` before a photo is loaded.
    pub fn stage(&self, stage: Stage) -> Option<&ChannelSet> {
        let d = self.derived.as_ref()?;
        Some(match stage {
            Stage::Derived => &d.channels,
            Stage::Normalized => &d.normalized,
            Stage::Stretched => &d.stretched,
        })
    }

    pub fn image(&self, key: ImageKey) -> Option<&GrayImage> {
        self.stage(key.stage).map(|set| set.get(key.channel))
    }

    /// Default export name for `key` under the current weights.
    pub fn default_file_name(&self, key: ImageKey, format: SaveFormat) -> String {
        key.default_file_name(self.weights.red, self.weights.blue, format.extension())
    }

    // -- Weights ---------------------------------------------------------

    pub fn set_red_weight(&mut self, red: f32) -> Update {
        let red = clamp_weight(red, self.weights.red);
        self.apply_weights(Weights { red, ..self.weights })
    }

    pub fn set_blue_weight(&mut self, blue: f32) -> Update {
        let blue = clamp_weight(blue, self.weights.blue);
        self.apply_weights(Weights { blue, ..self.weights })
    }

    pub fn set_weights(&mut self, red: f32, blue: f32) -> Update {
        let red = clamp_weight(red, self.weights.red);
        let blue = clamp_weight(blue, self.weights.blue);
        self.apply_weights(Weights { red, blue })
    }

    /// Back to 0.50 / 0.50.
    pub fn reset_weights(&mut self) -> Update {
        self.apply_weights(Weights::default())
    }

    fn apply_weights(&mut self, weights: Weights) -> Update {
        let mut update = Update::default();
        if weights != self.weights {
            self.weights = weights;
            if self.recompute_weighted() {
                update.dirty = Dirty::channel(Channel::GrayNoGreen);
            }
        }
        if self.weights.exceeds_unity() {
            let advisory = Advisory::WeightSumExceedsOne {
                red: self.weights.red,
                blue: self.weights.blue,
            };
            log_warn!("{}", advisory);
            update.advisories.push(advisory);
        }
        update
    }

    // -- Stretch parameters ---------------------------------------------

    pub fn set_lower_threshold(&mut self, lower: u8) -> Update {
        self.apply_stretch(StretchParams { lower, ..self.stretch })
    }

    pub fn set_upper_threshold(&mut self, upper: u8) -> Update {
        self.apply_stretch(StretchParams { upper, ..self.stretch })
    }

    pub fn set_thresholds(&mut self, lower: u8, upper: u8) -> Update {
        self.apply_stretch(StretchParams { lower, upper, ..self.stretch })
    }

    pub fn set_invert_lower(&mut self, invert: bool) -> Update {
        self.apply_stretch(StretchParams { invert_lower: invert, ..self.stretch })
    }

    pub fn set_invert_upper(&mut self, invert: bool) -> Update {
        self.apply_stretch(StretchParams { invert_upper: invert, ..self.stretch })
    }

    /// Apply a complete parameter block in one step.
    pub fn set_stretch_params(&mut self, params: StretchParams) -> Update {
        self.apply_stretch(params)
    }

    /// Back to 128 / 255 with both inversions off.
    pub fn reset_thresholds(&mut self) -> Update {
        self.apply_stretch(StretchParams::default())
    }

    fn apply_stretch(&mut self, mut params: StretchParams) -> Update {
        let requested = params.upper;
        let mut update = Update::default();
        if params.enforce_order() {
            let advisory = Advisory::UpperThresholdRaised {
                lower: params.lower,
                requested,
                upper: params.upper,
            };
            log_warn!("{}", advisory);
            update.advisories.push(advisory);
        }
        if params != self.stretch {
            self.stretch = params;
            if self.recompute_stretched() {
                update.dirty = Dirty::stage(Stage::Stretched);
            }
        }
        update
    }

    // -- Source inversion ----------------------------------------------

    /// Toggle the full tonal inversion applied before channel extraction.
    pub fn set_invert_source(&mut self, invert: bool) -> Update {
        if invert == self.invert_source {
            return Update::default();
        }
        self.invert_source = invert;
        if self.source.is_none() {
            return Update::default();
        }
        self.rebuild_all();
        self.full_update()
    }

    // -- Reset -----------------------------------------------------------

    /// Restore weights, thresholds and inversion flags to their defaults.
    /// Source inversion is a load-time choice and is left alone.
    pub fn reset_all(&mut self) -> Update {
        let weights = self.reset_weights();
        let stretch = self.reset_thresholds();
        weights.merge(stretch)
    }

    // -- Observer --------------------------------------------------------

    /// Hand every raster named in `update` and every advisory to `observer`.
    pub fn publish<O: SessionObserver + ?Sized>(&self, update: &Update, observer: &mut O) {
        for advisory in &update.advisories {
            observer.advisory(advisory);
        }
        for key in update.dirty.iter() {
            if let Some(img) = self.image(key) {
                observer.image_changed(key, img);
            }
        }
    }

    // -- Export ----------------------------------------------------------

    /// Write one derived raster to `path`.
    pub fn export(&self, key: ImageKey, path: &Path, options: &ExportOptions) -> Result<(), SessionError> {
        let img = self.image(key).ok_or(SessionError::NoImageLoaded)?;
        io::export_gray_image(img, path, options)?;
        log_info!("Saved {} to {}", key.title(), path.display());
        Ok(())
    }

    /// Write one derived raster into `dir` under its default name.
    /// Returns the path written.
    pub fn export_to_dir(
        &self,
        key: ImageKey,
        dir: &Path,
        options: &ExportOptions,
    ) -> Result<PathBuf, SessionError> {
        let format = options.format.unwrap_or_default();
        let path = dir.join(self.default_file_name(key, format));
        let options = ExportOptions { format: Some(format), ..*options };
        self.export(key, &path, &options)?;
        Ok(path)
    }

    // -- Recomputation ---------------------------------------------------

    fn full_update(&self) -> Update {
        let mut update = Update {
            dirty: if self.derived.is_some() { Dirty::ALL } else { Dirty::NONE },
            advisories: Vec::new(),
        };
        if self.weights.exceeds_unity() {
            update.advisories.push(Advisory::WeightSumExceedsOne {
                red: self.weights.red,
                blue: self.weights.blue,
            });
        }
        update
    }

    fn rebuild_all(&mut self) {
        let Some(source) = self.source.as_ref() else {
            self.derived = None;
            return;
        };
        let working = if self.invert_source { invert_rgb(source) } else { source.clone() };
        let channels = extract_channels(&working, self.weights);
        let normalized = channels.map(autocontrast);
        let params = self.stretch;
        let stretched = normalized.map(|img| stretch_with(img, &params));
        self.derived = Some(Derived { working, channels, normalized, stretched });
    }

    /// Re-derive GrayNoGreen through all three stages. False if nothing is loaded.
    fn recompute_weighted(&mut self) -> bool {
        let weights = self.weights;
        let params = self.stretch;
        let Some(d) = self.derived.as_mut() else { return false };
        let raw = extract_channel(&d.working, Channel::GrayNoGreen, weights);
        let norm = autocontrast(&raw);
        let stretched = stretch_with(&norm, &params);
        d.channels.set(Channel::GrayNoGreen, raw);
        d.normalized.set(Channel::GrayNoGreen, norm);
        d.stretched.set(Channel::GrayNoGreen, stretched);
        true
    }

    /// Re-run the stretch on all five normalized rasters. False if nothing is loaded.
    fn recompute_stretched(&mut self) -> bool {
        let params = self.stretch;
        let Some(d) = self.derived.as_mut() else { return false };
        d.stretched = d.normalized.map(|img| stretch_with(img, &params));
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn fundus_like() -> RgbImage {
        RgbImage::from_fn(16, 12, |x, y| {
            Rgb([(60 + x * 10) as u8, (20 + y * 5) as u8, (x * y) as u8])
        })
    }

    fn loaded() -> Session {
        let mut s = Session::new();
        s.set_source(fundus_like());
        s
    }

    #[test]
    fn load_computes_every_stage() {
        let mut s = Session::new();
        let update = s.set_source(fundus_like());
        assert_eq!(update.dirty, Dirty::ALL);
        assert_eq!(update.dirty.len(), 15);
        for key in ImageKey::all() {
            assert_eq!(s.image(key).map(|i| i.dimensions()), Some((16, 12)), "{:?}", key);
        }
    }

    #[test]
    fn weight_change_dirties_only_gray_no_green() {
        let mut s = loaded();
        let before = s.stage(Stage::Stretched).cloned();
        let update = s.set_red_weight(0.3);
        assert_eq!(update.dirty, Dirty::channel(Channel::GrayNoGreen));
        assert_eq!(update.dirty.len(), 3);
        assert!(update.advisories.is_empty());

        let after = s.stage(Stage::Stretched).cloned();
        let (before, after) = (before.unwrap(), after.unwrap());
        for channel in [Channel::Grayscale, Channel::Green, Channel::Red, Channel::Blue] {
            assert_eq!(before.get(channel), after.get(channel));
        }
    }

    #[test]
    fn unchanged_value_dirties_nothing() {
        let mut s = loaded();
        assert!(s.set_blue_weight(0.5).dirty.is_empty());
        assert!(s.set_lower_threshold(128).dirty.is_empty());
        assert!(s.set_invert_source(false).dirty.is_empty());
    }

    #[test]
    fn weight_sum_over_one_is_advisory_only() {
        let mut s = loaded();
        let update = s.set_weights(0.8, 0.6);
        assert_eq!(update.dirty, Dirty::channel(Channel::GrayNoGreen));
        assert_eq!(
            update.advisories,
            vec![Advisory::WeightSumExceedsOne { red: 0.8, blue: 0.6 }]
        );
        assert!(s.image(ImageKey::new(Channel::GrayNoGreen, Stage::Derived)).is_some());
    }

    #[test]
    fn threshold_change_dirties_all_stretched() {
        let mut s = loaded();
        let update = s.set_lower_threshold(40);
        assert_eq!(update.dirty, Dirty::stage(Stage::Stretched));

        let update = s.set_invert_upper(true);
        assert_eq!(update.dirty, Dirty::stage(Stage::Stretched));
    }

    #[test]
    fn upper_below_lower_is_corrected() {
        let mut s = loaded();
        let update = s.set_thresholds(200, 100);
        let p = s.stretch_params();
        assert_eq!((p.lower, p.upper), (200, 201));
        assert_eq!(
            update.advisories,
            vec![Advisory::UpperThresholdRaised { lower: 200, requested: 100, upper: 201 }]
        );
    }

    #[test]
    fn raising_lower_past_upper_drags_upper() {
        let mut s = loaded();
        s.set_upper_threshold(180);
        let update = s.set_lower_threshold(220);
        assert_eq!(update.advisories.len(), 1);
        assert_eq!(s.stretch_params().upper, 221);

        s.set_lower_threshold(255);
        let p = s.stretch_params();
        assert_eq!((p.lower, p.upper), (254, 255));
    }

    #[test]
    fn reset_restores_defaults() {
        let mut s = loaded();
        s.set_weights(0.1, 0.95);
        s.set_thresholds(10, 20);
        s.set_invert_lower(true);
        s.set_invert_upper(true);

        let update = s.reset_all();
        assert_eq!(update.dirty, Dirty::channel(Channel::GrayNoGreen).union(Dirty::stage(Stage::Stretched)));
        assert_eq!(s.weights(), Weights { red: 0.5, blue: 0.5 });
        assert_eq!(s.stretch_params(), StretchParams {
            lower: 128,
            upper: 255,
            invert_lower: false,
            invert_upper: false,
        });
    }

    #[test]
    fn setters_before_load_are_no_ops() {
        let mut s = Session::new();
        assert!(s.set_red_weight(0.2).dirty.is_empty());
        assert!(s.set_thresholds(10, 60).dirty.is_empty());
        assert!(s.set_invert_source(true).dirty.is_empty());
        assert!(s.reset_all().dirty.is_empty());
        assert!(s.stage(Stage::Normalized).is_none());
        assert!(matches!(
            s.export(ImageKey::new(Channel::Red, Stage::Derived), Path::new("x.png"), &ExportOptions::default()),
            Err(SessionError::NoImageLoaded)
        ));
    }

    #[test]
    fn parameters_set_before_load_apply_on_load() {
        let mut s = Session::new();
        s.set_thresholds(50, 100);
        s.set_source(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));
        let img = s.image(ImageKey::new(Channel::Grayscale, Stage::Stretched)).unwrap();
        assert!(img.pixels().all(|p| p.0[0] == 133));
    }

    #[test]
    fn all_red_scenario() {
        let mut s = Session::new();
        s.set_source(RgbImage::from_pixel(4, 4, Rgb([255, 0, 0])));
        let gray = |stage| s.image(ImageKey::new(Channel::Grayscale, stage)).unwrap().clone();
        assert!(gray(Stage::Derived).pixels().all(|p| p.0[0] == 76));
        assert!(gray(Stage::Normalized).pixels().all(|p| p.0[0] == 76));

        s.set_thresholds(50, 100);
        let stretched = s.image(ImageKey::new(Channel::Grayscale, Stage::Stretched)).unwrap();
        assert!(stretched.pixels().all(|p| p.0[0] == 133));
    }

    #[test]
    fn invert_source_recomputes_everything() {
        let mut s = loaded();
        let red_before = s.image(ImageKey::new(Channel::Red, Stage::Derived)).unwrap().clone();
        let update = s.set_invert_source(true);
        assert_eq!(update.dirty, Dirty::ALL);
        let red_after = s.image(ImageKey::new(Channel::Red, Stage::Derived)).unwrap();
        for (a, b) in red_before.pixels().zip(red_after.pixels()) {
            assert_eq!(a.0[0], 255 - b.0[0]);
        }
        // The stored source itself is never touched.
        assert_eq!(s.source(), Some(&fundus_like()));
    }

    #[test]
    fn publish_reports_dirty_images_and_advisories() {
        #[derive(Default)]
        struct Recorder {
            keys: Vec<ImageKey>,
            advisories: usize,
        }
        impl SessionObserver for Recorder {
            fn image_changed(&mut self, key: ImageKey, _image: &GrayImage) {
                self.keys.push(key);
            }
            fn advisory(&mut self, _advisory: &Advisory) {
                self.advisories += 1;
            }
        }

        let mut s = loaded();
        let update = s.set_weights(0.9, 0.9);
        let mut rec = Recorder::default();
        s.publish(&update, &mut rec);
        assert_eq!(rec.advisories, 1);
        assert_eq!(rec.keys, vec![
            ImageKey::new(Channel::GrayNoGreen, Stage::Derived),
            ImageKey::new(Channel::GrayNoGreen, Stage::Normalized),
            ImageKey::new(Channel::GrayNoGreen, Stage::Stretched),
        ]);
    }

    #[test]
    fn failed_load_keeps_previous_image() {
        let dir = tempfile::tempdir().unwrap();
        let bad = dir.path().join("bad.jpg");
        std::fs::write(&bad, b"garbage").unwrap();

        let mut s = loaded();
        let before = s.image(ImageKey::new(Channel::Blue, Stage::Normalized)).cloned();
        assert!(s.load(&bad).is_err());
        assert!(s.is_loaded());
        assert_eq!(s.image(ImageKey::new(Channel::Blue, Stage::Normalized)).cloned(), before);
    }

    #[test]
    fn path_tracks_last_successful_load() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("fundus.png");
        fundus_like().save(&good).unwrap();
        let bad = dir.path().join("bad.png");
        std::fs::write(&bad, b"not a png").unwrap();

        let mut s = Session::new();
        assert_eq!(s.path(), None);
        s.load(&good).unwrap();
        assert_eq!(s.path(), Some(good.as_path()));

        assert!(s.load(&bad).is_err());
        assert_eq!(s.path(), Some(good.as_path()));

        s.set_source(fundus_like());
        assert_eq!(s.path(), None);
    }
}
