//! EXIF extraction for uploaded originals.

use chrono::NaiveDateTime;
use std::io::Cursor;

use crate::db::ExifMeta;

/// Read the EXIF subset stored in item meta. `None` when the bytes carry no
/// EXIF block or none of the fields of interest.
pub fn extract_exif(bytes: &[u8]) -> Option<ExifMeta> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;
    let field = |tag| exif.get_field(tag, exif::In::PRIMARY);
    let text = |tag| {
        field(tag)
            .map(|f| f.display_value().to_string().trim_matches('"').trim().to_string())
            .filter(|s| !s.is_empty())
    };
    let rational = |tag| match field(tag).map(|f| &f.value) {
        Some(exif::Value::Rational(v)) => v.first().map(|r| r.to_f64()),
        _ => None,
    };
    let uint = |tag| field(tag).and_then(|f| f.value.get_uint(0));

    let mut meta = ExifMeta {
        camera_make: text(exif::Tag::Make),
        camera_model: text(exif::Tag::Model),
        lens_model: text(exif::Tag::LensModel),
        iso: uint(exif::Tag::PhotographicSensitivity),
        focal_length: rational(exif::Tag::FocalLength),
        f_number: rational(exif::Tag::FNumber),
        width: uint(exif::Tag::PixelXDimension).or_else(|| uint(exif::Tag::ImageWidth)),
        height: uint(exif::Tag::PixelYDimension).or_else(|| uint(exif::Tag::ImageLength)),
        ..Default::default()
    };

    if let Some(exif::Value::Rational(v)) = field(exif::Tag::ExposureTime).map(|f| &f.value) {
        if let Some(r) = v.first() {
            meta.exposure = Some(if r.num == 1 && r.denom > 1 {
                format!("1/{}", r.denom)
            } else {
                format_exposure(r.to_f64())
            });
        }
    }

    if let Some(raw) = field(exif::Tag::DateTimeOriginal) {
        if let exif::Value::Ascii(ref parts) = raw.value {
            meta.taken_at = parts
                .first()
                .and_then(|p| std::str::from_utf8(p).ok())
                .and_then(parse_exif_datetime);
        }
    }

    if let (Some(lat), Some(lat_ref), Some(lng), Some(lng_ref)) = (
        field(exif::Tag::GPSLatitude),
        field(exif::Tag::GPSLatitudeRef),
        field(exif::Tag::GPSLongitude),
        field(exif::Tag::GPSLongitudeRef),
    ) {
        if let (exif::Value::Rational(lat_dms), exif::Value::Rational(lng_dms)) = (&lat.value, &lng.value) {
            if lat_dms.len() >= 3 && lng_dms.len() >= 3 {
                let lat = dms_to_decimal(lat_dms[0].to_f64(), lat_dms[1].to_f64(), lat_dms[2].to_f64());
                let lng = dms_to_decimal(lng_dms[0].to_f64(), lng_dms[1].to_f64(), lng_dms[2].to_f64());
                let south = lat_ref.display_value().to_string().contains('S');
                let west = lng_ref.display_value().to_string().contains('W');
                meta.lat = Some(if south { -lat } else { lat });
                meta.lng = Some(if west { -lng } else { lng });
            }
        }
    }

    if meta.is_empty() {
        None
    } else {
        Some(meta)
    }
}

/// Shutter speed for display: whole fractions as `1/N`, everything else in
/// seconds.
pub fn format_exposure(seconds: f64) -> String {
    if seconds >= 1.0 {
        return format!("{}s", seconds);
    }
    let frac = 1.0 / seconds;
    if frac.is_finite() && frac == frac.round() {
        format!("1/{}", frac as u64)
    } else {
        format!("{}s", seconds)
    }
}

/// `YYYY:MM:DD HH:MM:SS` to RFC 3339 UTC.
fn parse_exif_datetime(raw: &str) -> Option<String> {
    NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S")
        .ok()
        .map(|dt| dt.and_utc().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string())
}

fn dms_to_decimal(degrees: f64, minutes: f64, seconds: f64) -> f64 {
    degrees + minutes / 60.0 + seconds / 3600.0
}
