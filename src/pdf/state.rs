//! Display state management

use super::types::{DisplayParameters, ReadingDirection};

/// Current display parameters of the viewer
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayState {
    pub params: DisplayParameters,
}

impl DisplayState {
    #[must_use]
    pub fn new(params: DisplayParameters) -> Self {
        let mut params = params;
        params.aspect_ratio = DisplayParameters::sanitized_aspect(params.aspect_ratio);
        Self { params }
    }

    /// Apply a command and return resulting effects
    #[must_use]
    pub fn apply(&mut self, cmd: Command) -> Vec<Effect> {
        match cmd {
            Command::SetParameters(params) => {
                let mut effects = self.apply(Command::SetAspectRatio(params.aspect_ratio));
                effects.extend(self.apply(Command::SetCoverOffset(params.cover_offset)));
                effects.extend(self.apply(Command::SetReadingDirection(params.reading_direction)));
                effects.dedup();
                effects
            }

            Command::SetCoverOffset(cover_offset) => {
                if self.params.cover_offset != cover_offset {
                    self.params.cover_offset = cover_offset;
                    vec![Effect::GeometryChanged]
                } else {
                    vec![]
                }
            }

            Command::ToggleCoverOffset => self.apply(Command::SetCoverOffset(!self.params.cover_offset)),

            Command::SetReadingDirection(direction) => {
                if self.params.reading_direction != direction {
                    self.params.reading_direction = direction;
                    vec![Effect::NavigationChanged]
                } else {
                    vec![]
                }
            }

            Command::ToggleReadingDirection => {
                self.apply(Command::SetReadingDirection(self.params.reading_direction.flipped()))
            }

            Command::SetAspectRatio(aspect) => {
                let aspect = DisplayParameters::sanitized_aspect(aspect);
                if (self.params.aspect_ratio - aspect).abs() > f32::EPSILON {
                    self.params.aspect_ratio = aspect;
                    vec![Effect::GeometryChanged]
                } else {
                    vec![]
                }
            }
        }
    }
}

/// Commands that modify display state
#[derive(Clone, Copy, Debug)]
pub enum Command {
    /// Replace all parameters at once
    SetParameters(DisplayParameters),
    SetCoverOffset(bool),
    ToggleCoverOffset,
    SetReadingDirection(ReadingDirection),
    ToggleReadingDirection,
    SetAspectRatio(f32),
}

/// Effects produced by state changes. None of them re-renders pages.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Page sizes or page count changed
    GeometryChanged,
    /// Screen side to navigation mapping changed
    NavigationChanged,
}
