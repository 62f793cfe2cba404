use std::borrow::Cow;

use super::*;

fn changed_pixels(a: &Image, b: &Image) -> Vec<(u32, u32)> {
    let mut out = Vec::new();
    for y in 0..a.height() {
        for x in 0..a.width() {
            if a.get(x, y) != b.get(x, y) {
                out.push((x, y));
            }
        }
    }
    out
}

#[test]
fn bgr_pixels_are_swapped_on_access() {
    let image = Image::from_raw(2, 1, PixelFormat::Bgr, vec![1, 2, 3, 4, 5, 6]).unwrap();
    assert_eq!(image.get(0, 0), Color::from_rgb8(3, 2, 1));
    assert_eq!(image.get(1, 0), Color::from_rgb8(6, 5, 4));

    let rgb = image.to_format(PixelFormat::Rgb);
    assert_eq!(rgb.data(), &[3, 2, 1, 6, 5, 4]);
    assert_eq!(rgb.get(0, 0), image.get(0, 0));
}

#[test]
fn alpha_is_dropped_and_restored() {
    let mut rgba = Image::new(1, 1);
    rgba.set(0, 0, Color::from_rgba8(10, 20, 30, 40));

    let bgr = rgba.to_format(PixelFormat::Bgr);
    assert_eq!(bgr.data(), &[30, 20, 10]);

    let bgra = bgr.to_format(PixelFormat::Bgra);
    assert_eq!(bgra.data(), &[30, 20, 10, 255]);
}

#[test]
fn as_format_borrows_when_matching() {
    let image = Image::with_format(4, 4, PixelFormat::Rgb);
    assert!(matches!(image.as_format(PixelFormat::Rgb), Cow::Borrowed(_)));
    let converted = image.as_format(PixelFormat::Rgba);
    assert!(matches!(converted, Cow::Owned(_)));
    assert_eq!(converted.format(), PixelFormat::Rgba);
    assert_eq!(converted.data().len(), 4 * 4 * 4);
}

#[test]
fn from_raw_checks_length() {
    let err = Image::from_raw(2, 2, PixelFormat::Rgb, vec![0; 11]).unwrap_err();
    assert!(err.to_string().contains("expected 12 bytes"), "{err}");
}

#[test]
fn clear_fills_every_pixel() {
    let mut image = Image::with_format(3, 2, PixelFormat::Bgra);
    image.clear(Color::WHITE);
    image.set(0, 1, Color::RED);
    assert_eq!(image.get(0, 1), Color::RED);
    assert_eq!(image.get(2, 1), Color::WHITE);
    assert_eq!(image.data()[..4], [255, 255, 255, 255]);
}

#[test]
fn filled_circle_stays_local() {
    let blank = Image::with_format(64, 48, PixelFormat::Bgr);
    let mut image = blank.clone();
    draw::circle(&mut image, 20, 30, 7).filled().color(Color::BLUE);

    let changed = changed_pixels(&blank, &image);
    assert!(!changed.is_empty());
    for (x, y) in changed {
        let (dx, dy) = (x as i32 - 20, y as i32 - 30);
        assert!(dx * dx + dy * dy <= 8 * 8, "pixel ({x}, {y}) is outside the circle");
        assert_eq!(image.get(x, y), Color::BLUE);
    }
    assert_eq!(image.get(20, 30), Color::BLUE);
    // Blue lands in the first byte of a BGR pixel.
    let off = (30 * 64 + 20) * 3;
    assert_eq!(&image.data()[off..off + 3], &[255, 0, 0]);
}

#[test]
fn drawing_outside_is_clipped() {
    let blank = Image::with_format(16, 16, PixelFormat::Rgb);
    let mut image = blank.clone();
    draw::circle(&mut image, -100, -100, 7).filled();
    draw::circle(&mut image, 40, 8, 7);
    draw::line(&mut image, -50, 200, -10, 300);
    draw::line(&mut image, 20, -5, 40, 30).stroke_width(3);
    assert_eq!(image, blank);
}

#[test]
fn extreme_coordinates_do_not_overflow() {
    let blank = Image::with_format(16, 16, PixelFormat::Rgb);
    let mut image = blank.clone();
    draw::circle(&mut image, i32::MIN, i32::MIN, 7).filled();
    draw::circle(&mut image, i32::MAX, i32::MAX, 3).stroke_width(2);
    draw::line(&mut image, i32::MIN, i32::MIN, i32::MAX, i32::MIN);
    assert_eq!(image, blank);

    draw::line(&mut image, i32::MIN, 5, i32::MAX, 5).color(Color::GREEN);
    for x in 0..16 {
        assert_eq!(image.get(x, 5), Color::GREEN);
    }
    assert_eq!(image.get(0, 4), Color::BLACK);
}

#[test]
fn lines() {
    let mut image = Image::with_format(10, 10, PixelFormat::Rgb);
    draw::line(&mut image, 0, 0, 9, 0).color(Color::GREEN);
    for x in 0..10 {
        assert_eq!(image.get(x, 0), Color::GREEN);
    }
    assert_eq!(image.get(0, 1), Color::BLACK);

    draw::line(&mut image, 0, 9, 9, 0);
    for x in 0..10 {
        assert_eq!(image.get(x, 9 - x), Color::BLUE);
    }
}

#[test]
fn text_draws_something() {
    let blank = Image::with_format(120, 100, PixelFormat::Rgb);
    let mut image = blank.clone();
    draw::text(&mut image, 10, 78, "30")
        .large()
        .align_left()
        .color(Color::MAGENTA);
    let changed = changed_pixels(&blank, &image);
    assert!(!changed.is_empty());
    assert!(changed.iter().all(|&(x, y)| x >= 10 && x < 40 && y > 60 && y < 90));
}
