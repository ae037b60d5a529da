// Devices: protocol decoders and the device bindings the sensor core drives.
// gatt.rs is the platform boundary; profiles.rs + gatt_device.rs cover table-driven
// SensorTags; gdx.rs wraps the streaming GDX vendor SDK.

pub mod decoders;
pub mod device;
pub mod gatt;
pub mod gatt_device;
pub mod gdx;
pub mod profiles;

pub use device::{Device, SharedDevice};
pub use gatt::{BluetoothPlatform, Peripheral};
pub use gatt_device::GattDevice;
pub use gdx::{GdxChannel, GdxDevice, GdxHandle, GdxSdk};
pub use profiles::{match_profile, DeviceProfile};
