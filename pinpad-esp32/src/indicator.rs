//! Board outputs: status LED and door relay

use esp_idf_svc::hal::gpio::{Output, OutputPin, PinDriver};
use log::info;
use pinpad_mcu::{IndicatorError, Level, StatusIndicator, TriggerError};

use crate::config::RELAY_PULSE;

/// LED that is lit while an accepted code is being shown
pub struct Led<P: OutputPin> {
    pin: PinDriver<'static, P, Output>,
}

impl<P: OutputPin> Led<P> {
    pub fn new(pin: PinDriver<'static, P, Output>) -> Self {
        Self { pin }
    }
}

impl<P: OutputPin> StatusIndicator for Led<P> {
    fn set_level(&mut self, level: Level) -> Result<(), IndicatorError> {
        let result = match level {
            Level::On => self.pin.set_high(),
            Level::Off => self.pin.set_low(),
        };
        result.map_err(|e| IndicatorError(e.to_string()))
    }
}

/// Accepted trigger pulsing a relay (door strike)
pub fn relay_pulse<P: OutputPin>(
    mut pin: PinDriver<'static, P, Output>,
) -> impl FnMut() -> Result<(), TriggerError> + Send + 'static {
    move || {
        info!("Opening door relay for {:?}", RELAY_PULSE);
        pin.set_high().map_err(|e| TriggerError(e.to_string()))?;
        std::thread::sleep(RELAY_PULSE);
        pin.set_low().map_err(|e| TriggerError(e.to_string()))
    }
}
