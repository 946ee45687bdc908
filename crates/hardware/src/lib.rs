//! Linux hardware behind the dispatch seams: GPIO character-device button
//! inputs and the sysfs PWM backlight.

pub mod backlight;
pub mod gpio;

pub use backlight::{PwmBacklight, PwmOutput, SysfsPwm, BRIGHTNESS_LEVELS};
pub use gpio::{ButtonLine, EdgeClock, GpioInputs};
