use image::{ImageBuffer, ImageFormat, Rgb};
use std::io::Cursor;
use std::sync::OnceLock;

use super::ThumbnailKind;

const WIDTH: u32 = 480;
const HEIGHT: u32 = 270;

static VIDEO: OnceLock<Vec<u8>> = OnceLock::new();
static ARCHIVE: OnceLock<Vec<u8>> = OnceLock::new();
static GENERIC: OnceLock<Vec<u8>> = OnceLock::new();

/// Built-in PNG written when no real thumbnail can be produced. Empty only
/// if encoding failed, which callers treat as "no thumbnail".
pub(super) fn png(kind: ThumbnailKind) -> &'static [u8] {
    let (cell, background, accent) = match kind {
        ThumbnailKind::Video => (&VIDEO, [32, 36, 48], [86, 101, 140]),
        ThumbnailKind::Archive => (&ARCHIVE, [48, 40, 28], [168, 124, 64]),
        ThumbnailKind::Directory | ThumbnailKind::Image => (&GENERIC, [40, 40, 40], [96, 96, 96]),
    };
    cell.get_or_init(|| render(background, accent))
}

fn render(background: [u8; 3], accent: [u8; 3]) -> Vec<u8> {
    // Flat card with a centred band, enough to read as "media" at a glance.
    let band_top = HEIGHT * 2 / 5;
    let band_bottom = HEIGHT * 3 / 5;
    let band_left = WIDTH / 4;
    let band_right = WIDTH * 3 / 4;

    let img = ImageBuffer::from_fn(WIDTH, HEIGHT, |x, y| {
        let in_band = (band_top..band_bottom).contains(&y) && (band_left..band_right).contains(&x);
        Rgb(if in_band { accent } else { background })
    });

    let mut bytes = Cursor::new(Vec::new());
    match img.write_to(&mut bytes, ImageFormat::Png) {
        Ok(()) => bytes.into_inner(),
        Err(err) => {
            tracing::warn!("failed to encode placeholder thumbnail: {err}");
            Vec::new()
        }
    }
}
