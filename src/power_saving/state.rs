use parse_display::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display(style = "SNAKE_CASE")]
pub enum PowerSavingState {
    NotTriggered,
    /// Idle detected while capturing: output is suppressed, capture goes on
    TriggeredRunning,
    /// Idle detected while capture is paused: LEDs are off, content changes
    /// are detected from still screenshots
    TriggeredNotRunning,
}

impl Default for PowerSavingState {
    fn default() -> Self {
        Self::NotTriggered
    }
}

/// Inputs of one evaluation cycle
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PowerSavingInputs {
    pub screen_saver_detection_applicable: bool,
    pub screen_saver_running: bool,
    pub manual_shutdown_requested: bool,
    pub static_duration_elapsed: bool,
    pub pipeline_running: bool,
}

impl PowerSavingInputs {
    pub fn screen_saver_triggered(&self) -> bool {
        self.screen_saver_detection_applicable && self.screen_saver_running
    }

    pub fn triggered(&self) -> bool {
        self.screen_saver_triggered()
            || self.manual_shutdown_requested
            || self.static_duration_elapsed
    }
}

/// Command for the output dispatcher resulting from a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum PowerCommand {
    /// Force all LEDs off
    #[display("turn off")]
    TurnOff,
    /// Let the next captured frame through
    #[display("resume output")]
    ResumeOutput,
    /// Explicitly turn the LEDs back on
    #[display("turn on")]
    TurnOn,
}

#[derive(Debug, Default)]
pub struct PowerSavingStateMachine {
    state: PowerSavingState,
}

impl PowerSavingStateMachine {
    pub fn state(&self) -> PowerSavingState {
        self.state
    }

    /// Run one evaluation cycle
    ///
    /// Returns the command to apply to the output, if the state changed.
    pub fn evaluate(&mut self, inputs: &PowerSavingInputs) -> Option<PowerCommand> {
        if inputs.triggered() {
            if self.state != PowerSavingState::NotTriggered {
                return None;
            }

            self.state = if inputs.pipeline_running {
                PowerSavingState::TriggeredRunning
            } else {
                PowerSavingState::TriggeredNotRunning
            };

            debug!(state = %self.state, inputs = ?inputs, "power saving on");
            Some(PowerCommand::TurnOff)
        } else {
            let command = match self.state {
                PowerSavingState::NotTriggered => return None,
                PowerSavingState::TriggeredRunning => PowerCommand::ResumeOutput,
                PowerSavingState::TriggeredNotRunning => PowerCommand::TurnOn,
            };

            self.state = PowerSavingState::NotTriggered;

            debug!(command = %command, "power saving off");
            Some(command)
        }
    }

    /// Final evaluation when the session stops
    ///
    /// Capture is stopped at this point, so the LEDs always end up off.
    pub fn teardown(&mut self) -> PowerCommand {
        self.state = PowerSavingState::TriggeredNotRunning;
        PowerCommand::TurnOff
    }
}
