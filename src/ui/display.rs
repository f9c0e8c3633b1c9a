//! SSD1306 OLED log widget.

use bt2ipc::logger::LogWidget;
use embedded_graphics::mono_font::ascii::FONT_6X10;
use embedded_graphics::mono_font::{MonoTextStyle, MonoTextStyleBuilder};
use embedded_graphics::pixelcolor::BinaryColor;
use embedded_graphics::prelude::*;
use embedded_graphics::text::Text;
use ssd1306::mode::BufferedGraphicsMode;
use ssd1306::prelude::*;
use ssd1306::I2CDisplayInterface;
use ssd1306::Ssd1306;

/// Type alias for the concrete display driver.
///
/// Generic over the I²C implementation so callers pass in their HAL's
/// I²C peripheral.
pub type Display<I2C> =
    Ssd1306<I2CInterface<I2C>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

/// Baseline of the first text row; FONT_6X10 rows are 10 px apart.
const FIRST_BASELINE: i32 = 8;
const LINE_HEIGHT: i32 = 10;

/// Initialise the SSD1306 display and clear the screen.
pub fn init<I2C>(i2c: I2C) -> Display<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    let interface = I2CDisplayInterface::new(i2c);
    let mut display = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
        .into_buffered_graphics_mode();
    let _ = display.init();
    display.clear_buffer();
    let _ = display.flush();
    display
}

fn text_style() -> MonoTextStyle<'static, BinaryColor> {
    MonoTextStyleBuilder::new()
        .font(&FONT_6X10)
        .text_color(BinaryColor::On)
        .build()
}

/// Renders the log pipeline's rolling text, one entry per row.
/// Long lines are clipped at the right edge.
pub struct OledLog<I2C> {
    display: Display<I2C>,
}

impl<I2C> OledLog<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    pub fn new(display: Display<I2C>) -> Self {
        Self { display }
    }
}

impl<I2C> LogWidget for OledLog<I2C>
where
    I2C: embedded_hal::i2c::I2c,
{
    fn set_text(&mut self, text: &str) {
        self.display.clear_buffer();
        for (row, line) in text.lines().enumerate() {
            let y = FIRST_BASELINE + row as i32 * LINE_HEIGHT;
            let _ = Text::new(line, Point::new(0, y), text_style()).draw(&mut self.display);
        }
        let _ = self.display.flush();
    }
}
