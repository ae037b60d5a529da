// Mock sensor: random-walk readings and a fake device picker, no hardware needed.

pub mod generator;
pub mod mock_device;
pub mod mock_sensor;

pub use generator::{entropy, Direction, Entropy, RandomWalk, WalkChannel};
pub use mock_device::{MockDevice, VirtualSensor};
pub use mock_sensor::{MockSensor, MockSensorOptions, MOCK_DEVICE_NAME};
