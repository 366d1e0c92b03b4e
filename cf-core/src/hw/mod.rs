//! Hardware access
//!
//! Everything that touches control nodes: the raw accessor, sensors,
//! actuators, the chassis watchdog and airflow detection.

pub mod actuator;
pub mod direction;
pub mod node;
pub mod sensor;
pub mod watchdog;

pub use actuator::Actuator;
pub use node::{NodeBus, PathCache, ReadStrategy};
pub use sensor::{SampleEvent, Samples, Sensor, SensorId};
pub use watchdog::Watchdog;
