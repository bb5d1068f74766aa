use approx::assert_relative_eq;

use crate::image::to_byte;
use crate::{ImageError, RgbaImage, Size};

#[test]
fn test_parse_ascii_ppm() {
    let text = b"P3\n# two pixels\n2 1\n255\n255 0 0   0 128 255\n";
    let image = RgbaImage::parse_ppm(text).unwrap();

    assert_eq!((image.width, image.height), (2, 1));
    assert_eq!(image.pixel(0, 0), [255, 0, 0, 255]);
    assert_eq!(image.pixel(1, 0), [0, 128, 255, 255]);
}

#[test]
fn test_parse_binary_ppm() {
    let mut bytes = b"P6 2 2 255\n".to_vec();
    bytes.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12]);
    let image = RgbaImage::parse_ppm(&bytes).unwrap();

    assert_eq!(image.pixel(0, 0), [1, 2, 3, 255]);
    assert_eq!(image.pixel(1, 1), [10, 11, 12, 255]);
}

#[test]
fn test_parse_ppm_errors() {
    assert!(matches!(RgbaImage::parse_ppm(b"P5 1 1 255\n\0"), Err(ImageError::Format(_))));
    assert!(matches!(RgbaImage::parse_ppm(b"P6 2 2 65535\n"), Err(ImageError::Format(_))));
    assert!(matches!(RgbaImage::parse_ppm(b"P6 0 2 255\n"), Err(ImageError::Format(_))));
    // raster shorter than the header promises
    assert!(matches!(RgbaImage::parse_ppm(b"P6 2 2 255\n\x01\x02"), Err(ImageError::Format(_))));
    assert!(matches!(RgbaImage::parse_ppm(b"P3 1 1"), Err(ImageError::Format(_))));
}

#[test]
fn test_parse_ppm_huge_header_is_an_error() {
    for header in [&b"P6\n65536 65536\n255\n"[..], b"P3 4294967295 4294967295 255 0 0 0"] {
        assert!(matches!(RgbaImage::parse_ppm(header), Err(ImageError::Format(_))));
    }
    // header claims far more pixels than the file carries
    let mut bytes = b"P6 100000 100000 255\n".to_vec();
    bytes.extend_from_slice(&[0; 30]);
    assert!(matches!(RgbaImage::parse_ppm(&bytes), Err(ImageError::Format(_))));
}

#[test]
fn test_from_pixels_checks_length() {
    assert!(RgbaImage::from_pixels(2, 2, vec![0; 16]).is_ok());
    assert!(RgbaImage::from_pixels(2, 2, vec![0; 15]).is_err());
}

#[test]
fn test_save_and_load_ppm() {
    let image = RgbaImage::test_pattern(17, 9, 4);
    let path = std::env::temp_dir().join(format!("kawase_blur_test_{}.ppm", std::process::id()));

    image.save_ppm(&path).unwrap();
    let loaded = RgbaImage::load_ppm(&path).unwrap();
    let _ = std::fs::remove_file(&path);

    assert_eq!(loaded, image);
}

#[test]
fn test_test_pattern_has_edges() {
    let image = RgbaImage::test_pattern(64, 64, 8);
    assert_eq!(image.pixels.len(), 64 * 64 * 4);
    assert_ne!(image.pixel(0, 0), image.pixel(8, 0));
    // the cross through the centre is white
    assert_eq!(image.pixel(32, 5), [255, 255, 255, 255]);
}

#[test]
fn test_mean_abs_difference() {
    let a = RgbaImage::from_pixels(1, 1, vec![10, 20, 30, 255]).unwrap();
    let b = RgbaImage::from_pixels(1, 1, vec![13, 20, 24, 0]).unwrap();

    assert_relative_eq!(a.mean_abs_difference(&a).unwrap(), 0.0);
    // alpha is ignored
    assert_relative_eq!(a.mean_abs_difference(&b).unwrap(), 3.0);
    assert_eq!(a.mean_abs_difference(&RgbaImage::new(2, 1)), None);
}

#[test]
fn test_argb_packing() {
    let image = RgbaImage::from_pixels(1, 1, vec![0x12, 0x34, 0x56, 0xff]).unwrap();
    assert_eq!(image.to_argb(), vec![0x0012_3456]);
    assert_eq!(to_byte(2.0), 255);
    assert_eq!(to_byte(-1.0), 0);
}

#[test]
fn test_scaled_to_nearest_neighbour() {
    let image = RgbaImage::test_pattern(8, 6, 2);

    let up = image.scaled_to(Size::new(16, 12));
    assert_eq!(up.size(), Size::new(16, 12));
    assert_eq!(up.to_argb().len(), 16 * 12);
    for (x, y) in [(0, 0), (5, 3), (15, 11)] {
        assert_eq!(up.pixel(x, y), image.pixel(x / 2, y / 2));
    }

    let down = image.scaled_to(Size::new(4, 3));
    assert_eq!(down.pixel(3, 2), image.pixel(6, 4));

    assert_eq!(image.scaled_to(image.size()), image);
}
