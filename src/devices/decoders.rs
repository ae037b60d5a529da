//! decoders.rs
//! Raw characteristic payload → physical units, per TI SensorTag chip.
//!
//! All payloads are little-endian. Humidity chips report two status bits in the
//! low end of the humidity word which must be masked off before scaling.

use crate::error::DecodeError;

/// Signature shared by every entry of a device profile table.
pub type Decoder = fn(&[u8]) -> Result<f64, DecodeError>;

const HUMIDITY_STATUS_MASK: u16 = !0x0003;

fn u16_at(data: &[u8], offset: usize) -> Result<u16, DecodeError> {
    match data.get(offset..offset + 2) {
        Some(b) => Ok(u16::from_le_bytes([b[0], b[1]])),
        None => Err(DecodeError::TooShort {
            expected: offset + 2,
            actual: data.len(),
        }),
    }
}

/// OPT3001 light sensor: 12-bit mantissa, 4-bit exponent.
pub fn opt3001_lux(data: &[u8]) -> Result<f64, DecodeError> {
    let raw = u16_at(data, 0)?;
    let mantissa = f64::from(raw & 0x0FFF);
    let exponent = i32::from((raw & 0xF000) >> 12);
    Ok(mantissa * 0.01 * 2f64.powi(exponent))
}

/// TMP007 (CC2650) die/ambient temperature, bytes 2..4, 14-bit left aligned.
pub fn tmp007_ambient_celsius(data: &[u8]) -> Result<f64, DecodeError> {
    let raw = u16_at(data, 2)?;
    Ok(f64::from(raw >> 2) * 0.031_25)
}

/// TMP006 (CC2541) ambient temperature, bytes 2..4, signed 1/128 °C.
pub fn tmp006_ambient_celsius(data: &[u8]) -> Result<f64, DecodeError> {
    let raw = u16_at(data, 2)? as i16;
    Ok(f64::from(raw) / 128.0)
}

/// HDC1000/HDC1080 temperature word, bytes 0..2.
pub fn hdc1000_celsius(data: &[u8]) -> Result<f64, DecodeError> {
    let raw = u16_at(data, 0)?;
    Ok(f64::from(raw) / 65_536.0 * 165.0 - 40.0)
}

/// HDC1000/HDC1080 relative humidity, bytes 2..4.
pub fn hdc1000_humidity(data: &[u8]) -> Result<f64, DecodeError> {
    let raw = u16_at(data, 2)? & HUMIDITY_STATUS_MASK;
    Ok(f64::from(raw) / 65_536.0 * 100.0)
}

/// SHT21 (CC2541) relative humidity, bytes 2..4.
pub fn sht21_humidity(data: &[u8]) -> Result<f64, DecodeError> {
    let raw = u16_at(data, 2)? & HUMIDITY_STATUS_MASK;
    Ok(-6.0 + 125.0 * f64::from(raw) / 65_536.0)
}
