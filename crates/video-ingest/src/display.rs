use crate::types::Frame;

/// What the viewer asked for after a frame was shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    Continue,
    Quit,
}

/// Interactive preview of annotated frames.
pub trait FrameDisplay {
    fn show(&mut self, frame: &Frame) -> DisplayEvent;

    fn close(&mut self);
}

/// Display used for unattended runs; never requests a stop.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessDisplay;

impl FrameDisplay for HeadlessDisplay {
    fn show(&mut self, _frame: &Frame) -> DisplayEvent {
        DisplayEvent::Continue
    }

    fn close(&mut self) {}
}
