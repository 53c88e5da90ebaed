//! Single-command simulation of extrusion and layer state
//!
//! Only the commands that influence progress estimation are interpreted;
//! everything else passes through as a no-op.

use super::fields::{command_code, field_value, layer_number};
use super::state::InterpreterState;

/// Category of a command line as far as the simulator is concerned
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LineKind {
    /// An existing progress report (M73, M117); never simulated
    ProgressReport,
    /// `;LAYER:<n>` sentinel
    LayerBoundary(i32),
    /// M82 / G90
    AbsoluteExtrusion,
    /// M83 / G91
    RelativeExtrusion,
    /// G92 with its optional E value
    PositionOverride(Option<f64>),
    /// G0 / G1 with its optional E value
    Move(Option<f64>),
    /// Anything else
    Inert,
}

impl LineKind {
    /// Classify a single command line
    pub fn classify(line: &str) -> Self {
        let m_code = command_code(line, 'M');
        let g_code = command_code(line, 'G');

        if matches!(m_code, Some(73) | Some(117)) {
            return Self::ProgressReport;
        }

        if let Some(layer) = layer_number(line) {
            return Self::LayerBoundary(layer);
        }

        match (m_code, g_code) {
            (Some(82), _) | (_, Some(90)) => Self::AbsoluteExtrusion,
            (Some(83), _) | (_, Some(91)) => Self::RelativeExtrusion,
            (_, Some(92)) => Self::PositionOverride(field_value(line, 'E')),
            (_, Some(0)) | (_, Some(1)) => Self::Move(field_value(line, 'E')),
            _ => Self::Inert,
        }
    }
}

/// Advance a snapshot by exactly one command line
pub fn advance(state: &InterpreterState, line: &str) -> InterpreterState {
    let mut next = state.clone();

    match LineKind::classify(line) {
        LineKind::ProgressReport | LineKind::Inert => {}
        LineKind::LayerBoundary(layer) => {
            next.first_layer_seen = true;
            next.current_layer = Some(layer);
        }
        LineKind::AbsoluteExtrusion => {
            if !state.extrusion_absolute {
                next.extrusion_absolute = true;
                tracing::trace!("{}", next.extrusion_mode_description());
            }
        }
        LineKind::RelativeExtrusion => {
            if state.extrusion_absolute {
                next.extrusion_absolute = false;
                tracing::trace!("{}", next.extrusion_mode_description());
            }
        }
        LineKind::PositionOverride(e) => {
            next.raw_extrusion_origin = e.unwrap_or(state.raw_extrusion_origin);
        }
        LineKind::Move(e) => {
            if state.extrusion_absolute {
                let target = e.unwrap_or(state.raw_extrusion_origin);
                next.cumulative_extrusion += target - state.raw_extrusion_origin;
                next.raw_extrusion_origin = target;
            } else {
                let delta = e.unwrap_or(0.0);
                next.cumulative_extrusion += delta;
                next.raw_extrusion_origin += delta;
            }
        }
    }

    next
}

/// Fold [`advance`] over a sequence of lines without touching `state`
pub fn simulate<'a, I>(state: &InterpreterState, lines: I) -> InterpreterState
where
    I: IntoIterator<Item = &'a str>,
{
    lines
        .into_iter()
        .fold(state.clone(), |current, line| advance(&current, line))
}
