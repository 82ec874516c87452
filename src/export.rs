//! PNG previews of a field.

use std::path::Path;

use image::{ImageBuffer, Rgb, RgbImage};

use crate::error::Result;
use crate::heightfield::HeightField;

/// Ground color: green lowlands, brown hills, white peaks.
/// `elev_ratio` is the height relative to the field's range, 0..=1.
fn ground_color(elev_ratio: f32) -> [u8; 3] {
    if elev_ratio < 0.3 {
        [(50.0 + 100.0 * elev_ratio) as u8, (120.0 + 80.0 * elev_ratio) as u8, 50]
    } else if elev_ratio < 0.7 {
        let t = (elev_ratio - 0.3) / 0.4;
        [(80.0 + 80.0 * t) as u8, (150.0 - 50.0 * t) as u8, (50.0 + 30.0 * t) as u8]
    } else {
        let t = (elev_ratio - 0.7) / 0.3;
        [(160.0 + 95.0 * t) as u8, (100.0 + 155.0 * t) as u8, (80.0 + 175.0 * t) as u8]
    }
}

/// Water color: light blue for puddles, dark blue at `max_water` and deeper.
fn water_color(depth: f32, max_water: f32) -> [u8; 3] {
    let t = (depth / max_water.max(f32::MIN_POSITIVE)).clamp(0.0, 1.0);
    [(90.0 - 70.0 * t) as u8, (160.0 - 110.0 * t) as u8, (255.0 - 100.0 * t) as u8]
}

/// Render the field top-down: terrain gradient with water drawn over wet cells.
pub fn render_preview(field: &HeightField) -> RgbImage {
    let size = field.size() as u32;
    let stats = field.stats();
    let range = (stats.max_height - stats.min_height).max(f32::MIN_POSITIVE);

    ImageBuffer::from_fn(size, size, |x, y| {
        let (x, y) = (x as usize, y as usize);
        let water = *field.water_map().get(x, y);
        if water > 0.0 {
            Rgb(water_color(water, stats.max_water))
        } else {
            let h = *field.height_map().get(x, y);
            Rgb(ground_color(((h - stats.min_height) / range).clamp(0.0, 1.0)))
        }
    })
}

/// Render only the ground as grayscale, 0 = lowest cell, 255 = highest.
pub fn render_heightmap(field: &HeightField) -> RgbImage {
    let size = field.size() as u32;
    let (min_h, max_h) = field.height_map().min_max().unwrap_or((0.0, 0.0));
    let range = (max_h - min_h).max(f32::MIN_POSITIVE);

    ImageBuffer::from_fn(size, size, |x, y| {
        let h = *field.height_map().get(x as usize, y as usize);
        let v = (((h - min_h) / range).clamp(0.0, 1.0) * 255.0) as u8;
        Rgb([v, v, v])
    })
}

pub fn export_preview<P: AsRef<Path>>(field: &HeightField, path: P) -> Result<()> {
    render_preview(field).save(path.as_ref())?;
    log::info!("Saved preview: {}", path.as_ref().display());
    Ok(())
}

pub fn export_heightmap<P: AsRef<Path>>(field: &HeightField, path: P) -> Result<()> {
    render_heightmap(field).save(path.as_ref())?;
    log::info!("Saved heightmap: {}", path.as_ref().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_preview_marks_wet_cells_blue() {
        let mut field = HeightField::new(3).unwrap();
        field.set_height_at(0, 0, 100.0).unwrap();
        field.set_water_at(2, 2, 1.0).unwrap();

        let img = render_preview(&field);
        assert_eq!(img.dimensions(), (3, 3));
        let Rgb([r, g, b]) = *img.get_pixel(2, 2);
        assert!(b > r && b > g);
        // the highest dry cell is near white
        assert!(img.get_pixel(0, 0).0.iter().all(|&c| c > 200));
    }

    #[test]
    fn test_heightmap_spans_gray_range() {
        let mut field = HeightField::new(2).unwrap();
        field.set_height_at(1, 1, 10.0).unwrap();
        let img = render_heightmap(&field);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(img.get_pixel(1, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_export_writes_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preview.png");
        export_preview(&HeightField::new(4).unwrap(), &path).unwrap();
        assert!(path.exists());
    }
}
