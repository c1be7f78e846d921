use anyhow::{Context as _, Result, bail};
use indexmap::IndexMap;
use libloading::Library;
use log::{debug, info};

use crate::poller::Sensor;
use crate::reading::{TcValue, ThermocoupleReading};

// Sentinel temperatures returned by the vendor library for channels that
// cannot report a valid reading. These are exact constants from the
// daqhats C API, not measurements.
const OPEN_TC_VALUE: f64 = -9999.0;
const OVERRANGE_TC_VALUE: f64 = -8888.0;
const COMMON_MODE_TC_VALUE: f64 = -7777.0;

const RESULT_SUCCESS: i32 = 0;

/// Type-K thermocouple, the rig's default.
pub const TC_TYPE_K: u8 = 1;

type OpenFn = unsafe extern "C" fn(u8) -> i32;
type CloseFn = unsafe extern "C" fn(u8) -> i32;
type TcTypeWriteFn = unsafe extern "C" fn(u8, u8, u8) -> i32;
type TInReadFn = unsafe extern "C" fn(u8, u8, *mut f64) -> i32;

/// MCC 134 thermocouple HAT, reached through the vendor's `libdaqhats`
/// shared library.
///
/// The library is loaded at runtime so the binary starts on any host; a
/// missing library or unaddressable board is an initialization fault
/// reported once at startup, after which the rig runs without this
/// sensor and warm-up blocks.
pub struct Mcc134 {
    lib: Library,
    address: u8,
    channels: Vec<u8>,
}

impl Mcc134 {
    pub fn open(address: u8, channels: &[u8], tc_type: u8) -> Result<Self> {
        if channels.is_empty() {
            bail!("no thermocouple channels configured");
        }

        // SAFETY: libdaqhats is the vendor's stable C API; the symbols
        // used here match its published signatures.
        let lib = unsafe { Library::new("libdaqhats.so.1") }
            .context("failed to load libdaqhats (is the daqhats package installed?)")?;

        let board = Self {
            lib,
            address,
            channels: channels.to_vec(),
        };

        let status = unsafe { board.sym::<OpenFn>(b"mcc134_open")?(address) };
        if status != RESULT_SUCCESS {
            bail!("failed to open MCC 134 at address {}: status {}", address, status);
        }

        for &ch in &board.channels {
            let status =
                unsafe { board.sym::<TcTypeWriteFn>(b"mcc134_tc_type_write")?(address, ch, tc_type) };
            if status != RESULT_SUCCESS {
                bail!(
                    "failed to configure thermocouple type on channel {}: status {}",
                    ch,
                    status
                );
            }
        }

        info!("MCC 134 initialized at address {}", address);
        Ok(board)
    }

    fn sym<T>(&self, name: &[u8]) -> Result<libloading::Symbol<'_, T>> {
        unsafe { self.lib.get(name) }
            .with_context(|| format!("missing daqhats symbol {}", String::from_utf8_lossy(name)))
    }

    fn read_channel(&self, ch: u8) -> Result<TcValue> {
        let mut value = 0.0f64;
        let status =
            unsafe { self.sym::<TInReadFn>(b"mcc134_t_in_read")?(self.address, ch, &mut value) };
        if status != RESULT_SUCCESS {
            bail!("t_in_read failed on channel {}: status {}", ch, status);
        }
        Ok(decode_tc_value(value))
    }
}

/// Map the vendor's sentinel temperatures to channel states. Sentinels
/// are surfaced as-is, never coerced into a usable temperature.
pub fn decode_tc_value(value: f64) -> TcValue {
    if value == OPEN_TC_VALUE {
        TcValue::Open
    } else if value == OVERRANGE_TC_VALUE {
        TcValue::OverRange
    } else if value == COMMON_MODE_TC_VALUE {
        TcValue::CommonMode
    } else {
        TcValue::Celsius(value)
    }
}

impl Sensor for Mcc134 {
    type Reading = ThermocoupleReading;

    fn label(&self) -> &'static str {
        "thermocouple"
    }

    /// Read every configured channel. A failed board read is transient:
    /// the whole poll yields no reading rather than a partial one.
    fn poll(&mut self) -> Option<ThermocoupleReading> {
        let mut channels = IndexMap::with_capacity(self.channels.len());
        for &ch in &self.channels {
            match self.read_channel(ch) {
                Ok(value) => {
                    channels.insert(ch, value);
                }
                Err(err) => {
                    debug!("thermocouple poll failed: {}", err);
                    return None;
                }
            }
        }
        Some(ThermocoupleReading { channels })
    }

    fn raw_log_header(&self) -> Vec<String> {
        let mut header = vec!["timestamp".to_string()];
        header.extend(self.channels.iter().map(|ch| format!("channel_{}_C", ch)));
        header
    }

    fn raw_log_row(&self, reading: &ThermocoupleReading) -> Vec<String> {
        self.channels
            .iter()
            .map(|ch| match reading.channel(*ch) {
                Some(TcValue::Celsius(c)) => format!("{:.2}", c),
                Some(sentinel) => sentinel.as_str().to_string(),
                None => String::new(),
            })
            .collect()
    }
}

impl Drop for Mcc134 {
    fn drop(&mut self) {
        if let Ok(close) = self.sym::<CloseFn>(b"mcc134_close") {
            unsafe { close(self.address) };
        }
    }
}
