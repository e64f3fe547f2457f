use std::fmt;

/// Unit of measurement reported by the scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unit {
    Grams,
    Ounces,
    Unknown(u8),
}

impl Unit {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            2 => Unit::Grams,
            5 => Unit::Ounces,
            other => Unit::Unknown(other),
        }
    }
}

impl Default for Unit {
    fn default() -> Self {
        Unit::Unknown(0)
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Unit::Grams => write!(f, "grams"),
            Unit::Ounces => write!(f, "ounces"),
            Unit::Unknown(code) => write!(f, "Unknown Unit ({code})"),
        }
    }
}

/// Operational mode of the scale. Exact modes can vary by model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScaleMode {
    #[default]
    Weighing,
    DualDisplay,
    PourOver,
    Espresso,
    EspressoEarlyTimer,
    AutoTareOnly,
    Unknown(u8),
}

impl ScaleMode {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => ScaleMode::Weighing,
            1 => ScaleMode::DualDisplay,
            2 => ScaleMode::PourOver,
            3 => ScaleMode::Espresso,
            4 => ScaleMode::EspressoEarlyTimer,
            5 => ScaleMode::AutoTareOnly,
            other => ScaleMode::Unknown(other),
        }
    }
}

impl fmt::Display for ScaleMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleMode::Weighing => write!(f, "Mode 1: Weighing"),
            ScaleMode::DualDisplay => write!(f, "Mode 2: Dual Display"),
            ScaleMode::PourOver => write!(f, "Mode 3: Pour Over"),
            ScaleMode::Espresso => write!(f, "Mode 4: Espresso"),
            ScaleMode::EspressoEarlyTimer => write!(f, "Mode 5: Espresso + Immediate Timer"),
            ScaleMode::AutoTareOnly => write!(f, "Mode 6: Auto-Tare Only"),
            ScaleMode::Unknown(code) => write!(f, "Unknown Mode ({code})"),
        }
    }
}

/// Kind of weight value carried by a weight event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightType {
    /// Net weight. Implies the scale is currently tared.
    Net,
    /// Gross weight, possibly "platform weight".
    Gross,
    Tare,
    Unknown(u8),
}

impl WeightType {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => WeightType::Net,
            1 => WeightType::Gross,
            2 => WeightType::Tare,
            other => WeightType::Unknown(other),
        }
    }
}

impl fmt::Display for WeightType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WeightType::Net => write!(f, "Net"),
            WeightType::Gross => write!(f, "Gross"),
            WeightType::Tare => write!(f, "Tare"),
            WeightType::Unknown(code) => write!(f, "Unknown ({code})"),
        }
    }
}

/// Auto-off timer setting, as the code the device uses on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum AutoOffSetting {
    #[default]
    Disabled,
    After5Min,
    After10Min,
    After20Min,
    After30Min,
    After60Min,
    Unknown(u8),
}

impl AutoOffSetting {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => AutoOffSetting::Disabled,
            1 => AutoOffSetting::After5Min,
            2 => AutoOffSetting::After10Min,
            3 => AutoOffSetting::After20Min,
            4 => AutoOffSetting::After30Min,
            5 => AutoOffSetting::After60Min,
            other => AutoOffSetting::Unknown(other),
        }
    }

    /// The wire code for this setting.
    pub fn code(&self) -> u8 {
        match self {
            AutoOffSetting::Disabled => 0,
            AutoOffSetting::After5Min => 1,
            AutoOffSetting::After10Min => 2,
            AutoOffSetting::After20Min => 3,
            AutoOffSetting::After30Min => 4,
            AutoOffSetting::After60Min => 5,
            AutoOffSetting::Unknown(code) => *code,
        }
    }
}

impl fmt::Display for AutoOffSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutoOffSetting::Disabled => write!(f, "Disabled"),
            AutoOffSetting::After5Min => write!(f, "5 Minutes"),
            AutoOffSetting::After10Min => write!(f, "10 Minutes"),
            AutoOffSetting::After20Min => write!(f, "20 Minutes"),
            AutoOffSetting::After30Min => write!(f, "30 Minutes"),
            AutoOffSetting::After60Min => write!(f, "60 Minutes"),
            AutoOffSetting::Unknown(code) => write!(f, "Unknown Setting ({code})"),
        }
    }
}

/// Key lock timer setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyDisableSetting {
    #[default]
    Off,
    After10s,
    After20s,
    After30s,
    Unknown(u8),
}

impl KeyDisableSetting {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => KeyDisableSetting::Off,
            1 => KeyDisableSetting::After10s,
            2 => KeyDisableSetting::After20s,
            3 => KeyDisableSetting::After30s,
            other => KeyDisableSetting::Unknown(other),
        }
    }
}

impl fmt::Display for KeyDisableSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyDisableSetting::Off => write!(f, "Off"),
            KeyDisableSetting::After10s => write!(f, "10 Seconds"),
            KeyDisableSetting::After20s => write!(f, "20 Seconds"),
            KeyDisableSetting::After30s => write!(f, "30 Seconds"),
            KeyDisableSetting::Unknown(code) => write!(f, "Unknown Setting ({code})"),
        }
    }
}

/// Beep sound setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SoundSetting {
    #[default]
    Off,
    On,
    Unknown(u8),
}

impl SoundSetting {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => SoundSetting::Off,
            1 => SoundSetting::On,
            other => SoundSetting::Unknown(other),
        }
    }

    pub fn is_on(&self) -> bool {
        matches!(self, SoundSetting::On)
    }
}

impl fmt::Display for SoundSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_on() {
            write!(f, "On")
        } else {
            write!(f, "Off")
        }
    }
}

/// Display resolution setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResolutionSetting {
    /// Low precision, .1g increments.
    #[default]
    Low,
    /// High precision, 0.01g increments.
    High,
    Unknown(u8),
}

impl ResolutionSetting {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => ResolutionSetting::Low,
            1 => ResolutionSetting::High,
            other => ResolutionSetting::Unknown(other),
        }
    }
}

impl fmt::Display for ResolutionSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolutionSetting::High => write!(f, "High"),
            _ => write!(f, "Low"),
        }
    }
}

/// Maximum weight capacity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CapacitySetting {
    #[default]
    Grams1000,
    Grams2000,
    Unknown(u8),
}

impl CapacitySetting {
    pub(crate) fn from_code(code: u8) -> Self {
        match code {
            0 => CapacitySetting::Grams1000,
            1 => CapacitySetting::Grams2000,
            other => CapacitySetting::Unknown(other),
        }
    }
}

impl fmt::Display for CapacitySetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapacitySetting::Grams2000 => write!(f, "2000g"),
            _ => write!(f, "1000g"),
        }
    }
}

/// Firmware version split into its three reported components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FirmwareVersion {
    pub main: u8,
    pub sub: u8,
    pub add: u8,
}

impl fmt::Display for FirmwareVersion {
    /// Formats as e.g. "1.0.18".
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.main, self.sub, self.add)
    }
}

/// Parsed weight information from a weight event.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeightMessage {
    pub weight: f64,
    pub weight_type: WeightType,
    /// True if the reading is stable.
    pub is_stable: bool,
}

/// Parsed settings from a status event message.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct StatusMessage {
    pub status_length: u8,
    /// Battery level percentage (0.0-100.0).
    pub battery: f64,
    pub is_timer_running: bool,
    pub unit: Unit,
    pub is_countdown_running: bool,
    pub scale_mode: ScaleMode,
    pub is_tared: bool,
    pub sleep_timer_setting: AutoOffSetting,
    pub key_disable_setting: KeyDisableSetting,
    pub sound_setting: SoundSetting,
    pub resolution_setting: ResolutionSetting,
    pub capacity_setting: CapacitySetting,
    /// Timer value in seconds, when the longer status payload carries one.
    pub timer_value: u16,
}

/// Parsed device information from an info event message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceInfoMessage {
    pub firmware: FirmwareVersion,
    pub is_password_set: bool,
}

/// Timer reading in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimerMessage {
    pub seconds: f64,
}

/// Which physical button a button event reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonKind {
    Tare,
    Start,
    Stop,
    Reset,
    Unknown,
}

/// A button press event, with whatever weight or timer reading the scale
/// attached to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ButtonMessage {
    pub button: ButtonKind,
    pub weight: Option<f64>,
    pub time: Option<f64>,
}

/// A recognized frame the decoder has no specific handling for. Not an
/// error: these are kept around so unsupported protocol coverage can be
/// logged and reverse-engineered later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnhandledMessage {
    pub command_id: u8,
    /// The nested event type, when the frame was an event container.
    pub event_type: Option<u8>,
    pub payload: Vec<u8>,
    pub frame: Vec<u8>,
}

/// Every message the Lunar decoder can produce.
#[derive(Debug, Clone, PartialEq)]
pub enum LunarMessage {
    Weight(WeightMessage),
    Status(StatusMessage),
    DeviceInfo(DeviceInfoMessage),
    Timer(TimerMessage),
    Button(ButtonMessage),
    Unhandled(UnhandledMessage),
}
