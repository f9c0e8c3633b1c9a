//! On-device log view: an SSD1306 128×64 OLED over I²C showing the most
//! recent log lines.

pub mod display;
