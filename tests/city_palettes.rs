use std::fs;
use std::path::Path;

use chromatic_geography::config::CityQuery;
use chromatic_geography::pipeline::{Pipeline, discover_images};
use chromatic_geography::report::{ImageRecord, read_report, write_report};
use chromatic_geography::{
    Aggregator, CityPalette, CityPaletteAccumulator, CityReport, Color, ExtractionConfig, HueFamily,
    ImagePalette, PaletteError, PipelineConfig, Quantizer, Report, compute_metrics,
};
use image::{Rgba, RgbaImage};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

const RED: Color = Color::new(255, 0, 0);
const ORANGE: Color = Color::new(255, 165, 0);
const BLUE: Color = Color::new(0, 0, 255);
const GREEN: Color = Color::new(0, 128, 0);

fn random_palettes(rng: &mut StdRng, images: usize, k: usize) -> Vec<ImagePalette> {
    (0..images)
        .map(|_| {
            let colors = (0..k)
                .map(|_| {
                    Color::new(
                        rng.gen_range(0..=255),
                        rng.gen_range(0..=255),
                        rng.gen_range(0..=255),
                    )
                })
                .collect();
            ImagePalette::new(colors)
        })
        .collect()
}

#[test]
fn every_extracted_color_is_counted_once() {
    let mut rng = StdRng::seed_from_u64(7);
    for images in [1, 5, 40] {
        let palettes = random_palettes(&mut rng, images, 6);
        let acc = Aggregator::default().accumulate(&palettes);
        assert_eq!(acc.total(), images * 6);
        let ranked_total: usize = acc.ranked().iter().map(|b| b.count).sum();
        assert_eq!(ranked_total, images * 6);
    }
}

#[test]
fn aggregation_is_deterministic() {
    let mut rng = StdRng::seed_from_u64(42);
    let palettes = random_palettes(&mut rng, 25, 6);
    let aggregator = Aggregator::default();
    assert_eq!(
        aggregator.aggregate(&palettes).unwrap(),
        aggregator.aggregate(&palettes).unwrap()
    );
}

#[test]
fn bucket_counts_do_not_depend_on_image_order() {
    let mut rng = StdRng::seed_from_u64(3);
    let palettes = random_palettes(&mut rng, 30, 6);
    let mut shuffled = palettes.clone();
    shuffled.shuffle(&mut rng);

    let aggregator = Aggregator::default();
    let a = aggregator.accumulate(&palettes);
    let b = aggregator.accumulate(&shuffled);
    assert_eq!(a.total(), b.total());
    assert_eq!(a.len(), b.len());
    for palette in &palettes {
        for color in palette.colors() {
            assert_eq!(a.count_of(*color), b.count_of(*color));
        }
    }
}

#[test]
fn merged_accumulators_match_a_single_pass() {
    let mut rng = StdRng::seed_from_u64(11);
    let palettes = random_palettes(&mut rng, 12, 6);
    let aggregator = Aggregator::default();

    let mut left = CityPaletteAccumulator::new(aggregator.bucket_width());
    let mut right = CityPaletteAccumulator::new(aggregator.bucket_width());
    for p in &palettes[..6] {
        left.add_palette(p);
    }
    for p in &palettes[6..] {
        right.add_palette(p);
    }
    left.merge(right);

    let single = aggregator.accumulate(&palettes);
    assert_eq!(
        aggregator.finish(&left).unwrap(),
        aggregator.finish(&single).unwrap()
    );
}

#[test]
fn no_palettes_is_an_error() {
    let err = Aggregator::default().aggregate(&[]).unwrap_err();
    assert!(matches!(err, PaletteError::EmptyInput));
}

#[test]
fn identical_colors_collapse_to_one() {
    let palettes = vec![ImagePalette::new(vec![RED; 6]); 4];
    let city = Aggregator::default().aggregate(&palettes).unwrap();
    assert_eq!(city.colors(), &[RED]);

    let metrics = compute_metrics(&city, 6);
    assert_eq!(metrics.contrast, 0.0);
    assert!((metrics.hue_diversity - 5.0 / 6.0).abs() < 1e-9);
}

#[test]
fn warm_city_end_to_end() {
    let image = ImagePalette::new(vec![RED, RED, ORANGE, BLUE, BLUE, GREEN]);
    let palettes = vec![image; 3];

    let city = Aggregator::default().aggregate(&palettes).unwrap();
    assert_eq!(city.colors(), &[RED, BLUE, ORANGE, GREEN]);

    let metrics = compute_metrics(&city, 6);
    assert!(metrics.temperature > 50.0);
    assert!((metrics.temperature - 62.5).abs() < 1e-6);
    // four families of one color each, measured against K = 6
    assert!((metrics.hue_diversity - 5.0 / 6.0).abs() < 1e-6);
    assert!(metrics.contrast > 0.0 && metrics.contrast <= 100.0);
    assert_eq!(metrics.dominant_family, Some(HueFamily::Red));
}

#[test]
fn metrics_stay_in_range() {
    let mut rng = StdRng::seed_from_u64(99);
    for _ in 0..50 {
        let palettes = random_palettes(&mut rng, 8, 6);
        let metrics = compute_metrics(&Aggregator::default().aggregate(&palettes).unwrap(), 6);
        assert!((0.0..=100.0).contains(&metrics.temperature));
        assert!((0.0..=100.0).contains(&metrics.saturation));
        assert!((0.0..=100.0).contains(&metrics.contrast));
        assert!((0.0..=1.0).contains(&metrics.hue_diversity));
    }
}

fn city_report(city: &str, hex: &[&str]) -> CityReport {
    let palette = CityPalette::from_hex(hex).unwrap();
    CityReport {
        city: city.to_string(),
        image_count: 1,
        extracted_count: 1,
        skipped: Vec::new(),
        individual_palettes: vec![ImageRecord {
            image: format!("{city}.jpg"),
            colors: palette.hex(),
        }],
        palette: palette.colors().to_vec(),
        palette_hex: palette.hex(),
        metrics: compute_metrics(&palette, 6),
    }
}

fn reference_cities() -> Report {
    Report {
        cities: vec![
            city_report(
                "bangkok",
                &["#e6ab22", "#d95e21", "#bf2630", "#f2cb30", "#326eb2", "#2d8c27"],
            ),
            city_report(
                "santorini",
                &["#215ba6", "#f5f5f5", "#3f94d1", "#7ec7e6", "#cc3d8d", "#2b336b"],
            ),
            city_report(
                "singapore",
                &["#338037", "#599e47", "#1c5e22", "#87c244", "#69818c", "#bf9f60"],
            ),
            city_report(
                "jaipur",
                &["#d96c8d", "#e89768", "#bf4d58", "#f0c8a1", "#2f4a7a", "#4a7fa8"],
            ),
            city_report(
                "copenhagen",
                &["#d9a441", "#bf392a", "#2c608a", "#e8d5ae", "#4b6c7d", "#1e3e59"],
            ),
            city_report(
                "marrakech",
                &["#c2512f", "#d98a4a", "#8f3c2b", "#e6c79c", "#2a7a8c", "#408070"],
            ),
        ],
        missing: Vec::new(),
    }
}

#[test]
fn reference_city_rankings() {
    let report = reference_cities();

    let warmest = report.warmest().unwrap();
    assert_eq!(warmest.city, "bangkok");
    assert!((warmest.metrics.temperature - 76.0).abs() < 1.0);
    assert!((warmest.metrics.saturation - 79.0).abs() < 1.0);

    let coolest = report.coolest().unwrap();
    assert_eq!(coolest.city, "santorini");
    assert!((coolest.metrics.temperature - 24.0).abs() < 1.0);

    let green: Vec<&str> = report
        .dominated_by(HueFamily::Green)
        .iter()
        .map(|c| c.city.as_str())
        .collect();
    assert_eq!(green, vec!["singapore"]);
}

#[test]
fn report_survives_a_round_trip_through_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cities.json");
    let report = reference_cities();
    write_report(&path, &report).unwrap();
    assert_eq!(read_report(&path).unwrap(), report);
}

const BANDS: [(Color, u32); 6] = [
    (Color::new(200, 30, 40), 60),
    (Color::new(30, 90, 200), 50),
    (Color::new(240, 200, 40), 40),
    (Color::new(40, 160, 70), 30),
    (Color::new(150, 60, 170), 20),
    (Color::new(20, 190, 190), 10),
];

fn write_banded_png(path: &Path) {
    write_bands_png(path, &BANDS);
}

fn write_bands_png(path: &Path, bands: &[(Color, u32)]) {
    let total: u32 = bands.iter().map(|(_, w)| w).sum();
    let img = RgbaImage::from_fn(total, 12, |x, _| {
        let mut edge = 0;
        for (c, w) in bands {
            edge += w;
            if x < edge {
                return Rgba([c.r, c.g, c.b, 255]);
            }
        }
        Rgba([0, 0, 0, 255])
    });
    img.save(path).unwrap();
}

#[test]
fn pipeline_runs_over_a_directory_of_photos() {
    let root = tempfile::tempdir().unwrap();
    let city_dir = root.path().join("images").join("lisbon");
    fs::create_dir_all(&city_dir).unwrap();
    for name in ["01.png", "02.png", "03.png"] {
        write_banded_png(&city_dir.join(name));
    }
    fs::write(city_dir.join("04.jpg"), b"truncated").unwrap();

    let config = PipelineConfig {
        images_dir: root.path().join("images"),
        output_dir: root.path().join("colors"),
        extraction: ExtractionConfig {
            quantizer: Quantizer::MedianCut,
            resize: None,
            curate: false,
            ..ExtractionConfig::default()
        },
        cities: vec![
            CityQuery::new("lisbon", &["lisbon tram"]),
            CityQuery::new("havana", &["havana street"]),
        ],
        ..PipelineConfig::default()
    };
    let report = Pipeline::new(config).unwrap().run();

    assert_eq!(report.cities.len(), 1);
    let lisbon = &report.cities[0];
    assert_eq!(lisbon.city, "lisbon");
    assert_eq!(lisbon.image_count, 4);
    assert_eq!(lisbon.extracted_count, 3);
    assert_eq!(lisbon.skipped.len(), 1);
    assert_eq!(lisbon.skipped[0].image, "04.jpg");
    assert_eq!(lisbon.individual_palettes.len(), 3);

    assert_eq!(lisbon.palette.len(), 6);
    for (band, _) in &BANDS {
        assert!(lisbon.palette.contains(band));
    }
    assert_eq!(lisbon.metrics, compute_metrics(&lisbon.city_palette().unwrap(), 6));

    assert_eq!(report.missing.len(), 1);
    assert_eq!(report.missing[0].city, "havana");
}

/// Six bands per image, every color sitting half a unit off its bucket's
/// center, so all buckets tie on count and offset.
fn centered_bands(image: usize) -> Vec<(Color, u32)> {
    let level = |n: usize| (16 + 32 * (n % 8)) as u8;
    (0..6)
        .map(|band| {
            let idx = image * 6 + band;
            let color = Color::new(level(idx), level(idx / 8), level(3));
            (color, 60 - 10 * band as u32)
        })
        .collect()
}

#[test]
fn tied_buckets_follow_file_name_order() {
    let root = tempfile::tempdir().unwrap();
    let city_dir = root.path().join("images").join("porto");
    fs::create_dir_all(&city_dir).unwrap();
    let names = ["a.png", "b.png", "c.png", "d.png", "e.png", "f.png", "g.png", "h.png"];
    // written last-to-first so directory order disagrees with name order
    for (i, name) in names.iter().enumerate().rev() {
        write_bands_png(&city_dir.join(name), &centered_bands(i));
    }

    let config = PipelineConfig {
        images_dir: root.path().join("images"),
        extraction: ExtractionConfig {
            quantizer: Quantizer::MedianCut,
            resize: None,
            curate: false,
            ..ExtractionConfig::default()
        },
        cities: vec![CityQuery::new("porto", &["porto azulejos"])],
        ..PipelineConfig::default()
    };
    let pipeline = Pipeline::new(config).unwrap();

    let images = discover_images(&city_dir).unwrap();
    let (palettes, skipped) = pipeline.extract_images("porto", &images);
    assert!(skipped.is_empty());
    let order: Vec<&str> = palettes.iter().map(|p| p.image.as_str()).collect();
    assert_eq!(order, names);
    for (i, extracted) in palettes.iter().enumerate() {
        let expected: Vec<Color> = centered_bands(i).iter().map(|(c, _)| *c).collect();
        assert_eq!(extracted.palette.colors(), expected.as_slice());
    }

    // every bucket holds one color at the same offset: the first image wins
    let first: Vec<Color> = centered_bands(0).iter().map(|(c, _)| *c).collect();
    for _ in 0..5 {
        let report = pipeline.run();
        assert_eq!(report.cities[0].palette, first);
    }
}
