mod ramp;

pub use ramp::{RampMeter, RampOptions};
