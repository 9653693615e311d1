//! Deliverability & Forecast
//!
//! Production-side outputs derived from a matched `ModelParameters`:
//!
//! - `capacity` - kh, productivity index, flow efficiency, damage ratio
//! - `ipr` - Darcy / Vogel inflow performance curves
//! - `forecast` - rate-schedule pressure forecast and its stimulated variant

pub mod capacity;
pub mod forecast;
pub mod ipr;

pub use capacity::{drainage_radius, flow_capacity, minimum_skin, productivity_index};
pub use forecast::{Forecast, ForecastPoints, RateSchedule, RateStep};
pub use ipr::{IprCurve, IprPoints};
