//! Load → adjust → export against real files on disk.

use std::fs;

use image::{GrayImage, Rgb, RgbImage};

use fundus_stretch::io::{ExportOptions, SaveFormat};
use fundus_stretch::ops::adjustments::{autocontrast, stretch};
use fundus_stretch::{Channel, Dirty, ImageKey, Session, Stage};

fn fundus_photo() -> RgbImage {
    // Reddish disc on a dark background, like a retina shot.
    RgbImage::from_fn(32, 24, |x, y| {
        let dx = x as i32 - 16;
        let dy = y as i32 - 12;
        let d2 = (dx * dx + dy * dy) as u32;
        if d2 < 100 {
            Rgb([230, 150, 60 + (d2 / 2) as u8])
        } else {
            Rgb([40 + (x * 3) as u8, 20 + y as u8, 10])
        }
    })
}

#[test]
fn load_adjust_export_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let src = dir.path().join("fundus.png");
    fundus_photo().save(&src).unwrap();

    let mut session = Session::new();
    let update = session.load(&src).unwrap();
    assert_eq!(update.dirty, Dirty::ALL);
    assert_eq!(session.path(), Some(src.as_path()));

    let update = session.set_weights(0.7, 0.2);
    assert_eq!(update.dirty, Dirty::channel(Channel::GrayNoGreen));

    let key = ImageKey::new(Channel::GrayNoGreen, Stage::Derived);
    let written = session
        .export_to_dir(key, dir.path(), &ExportOptions::default())
        .unwrap();
    assert_eq!(
        written.file_name().unwrap().to_string_lossy(),
        "GrayscaleNoGreen_R0.70_B0.20.png"
    );

    let reloaded: GrayImage = image::open(&written).unwrap().to_luma8();
    assert_eq!(&reloaded, session.image(key).unwrap());

    // No temp files left next to the export.
    let leftovers = fs::read_dir(dir.path())
        .unwrap()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .count();
    assert_eq!(leftovers, 0);
}

#[test]
fn stretched_stage_matches_pure_pipeline() {
    let mut session = Session::new();
    session.set_source(fundus_photo());
    session.set_thresholds(40, 190);
    session.set_invert_lower(true);

    for channel in Channel::ALL {
        let derived = session.image(ImageKey::new(channel, Stage::Derived)).unwrap();
        let expected = stretch(&autocontrast(derived), 40, 190, true, false);
        assert_eq!(
            session.image(ImageKey::new(channel, Stage::Stretched)).unwrap(),
            &expected,
            "{:?}",
            channel
        );
    }
}

#[test]
fn every_raster_exports_in_every_format() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new();
    session.set_source(fundus_photo());

    for format in [SaveFormat::Png, SaveFormat::Jpeg, SaveFormat::Bmp, SaveFormat::Tiff] {
        let out = dir.path().join(format.extension());
        fs::create_dir(&out).unwrap();
        let options = ExportOptions { format: Some(format), ..Default::default() };
        for key in ImageKey::all() {
            session.export_to_dir(key, &out, &options).unwrap();
        }
        assert_eq!(fs::read_dir(&out).unwrap().count(), 15, "{:?}", format);
    }
}

#[test]
fn export_to_missing_directory_fails_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let mut session = Session::new();
    session.set_source(fundus_photo());

    let target = dir.path().join("nope").join("x.png");
    let key = ImageKey::new(Channel::Green, Stage::Normalized);
    assert!(session.export(key, &target, &ExportOptions::default()).is_err());
    assert!(!target.exists());
}
