pub mod avrdude;
pub mod detector;
pub mod discovery;
pub mod logger;
pub mod serial;
pub mod usb;
