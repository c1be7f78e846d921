use indexmap::IndexMap;

/// One complete sample from the infrared gas analyzer.
///
/// Parsers produce either a fully populated reading or nothing at all;
/// a payload with any field missing or unparseable yields no reading.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GasReading {
    pub co2_ppm: f64,

    pub h2o_mmol: f64,

    pub cell_temp_c: f64,

    pub cell_pressure_kpa: f64,

    pub dew_point_c: f64,
}

/// A single thermocouple channel value.
///
/// The DAQ board reports three sentinel states alongside ordinary
/// temperatures; they mean "no usable temperature" and must never be
/// coerced to a number.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TcValue {
    Celsius(f64),
    /// Open thermocouple (broken or disconnected wire).
    Open,
    /// Reading outside the common-mode/measurement range.
    OverRange,
    /// Common-mode voltage error between channels.
    CommonMode,
}

impl TcValue {
    pub fn as_celsius(&self) -> Option<f64> {
        match self {
            TcValue::Celsius(c) => Some(*c),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TcValue::Celsius(_) => "ok",
            TcValue::Open => "Open",
            TcValue::OverRange => "OverRange",
            TcValue::CommonMode => "CommonMode",
        }
    }
}

/// One poll of the thermocouple board, all configured channels at once.
#[derive(Debug, Clone, PartialEq)]
pub struct ThermocoupleReading {
    /// Channel number to value, in channel order.
    pub channels: IndexMap<u8, TcValue>,
}

impl ThermocoupleReading {
    pub fn channel(&self, ch: u8) -> Option<TcValue> {
        self.channels.get(&ch).copied()
    }
}
