//! Device selection
//!
//! An empty line (or end of input) finishes selection. Anything that is not a
//! usable input device index is rejected with a reason and the user is asked
//! again; previous choices are kept. Entering a selected index deselects it.

use multimic_audio::DeviceInfo;
use std::collections::BTreeSet;
use std::io::{self, BufRead, Write};
use thiserror::Error;

const PROMPT: &str = "Enter a device id to toggle it, or press Enter to finish";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("{0:?} is not a device id")]
    NotANumber(String),

    /// `index` is the id as entered, which may not fit any integer type
    #[error("Device id {index} is out of range (0..{count})")]
    OutOfRange { index: String, count: usize },

    #[error("Device {0} has no input channels")]
    NoInputChannels(usize),
}

/// Chosen device indices, iterated in ascending order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    indices: BTreeSet<usize>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a selection without prompting. Duplicates collapse.
    pub fn from_indices(
        devices: &[DeviceInfo],
        indices: &[usize],
    ) -> Result<Self, SelectionError> {
        let mut selection = Self::new();
        for &index in indices {
            selection.indices.insert(check_index(devices, index)?);
        }
        Ok(selection)
    }

    /// Flip `index`; returns whether it is now selected
    pub fn toggle(&mut self, index: usize) -> bool {
        if self.indices.remove(&index) {
            false
        } else {
            self.indices.insert(index);
            true
        }
    }

    pub fn contains(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Descriptors of the selected devices, in selection order
    pub fn devices(&self, devices: &[DeviceInfo]) -> Vec<DeviceInfo> {
        self.iter()
            .filter_map(|index| devices.get(index).cloned())
            .collect()
    }
}

/// Validate an index against the device list
pub fn check_index(devices: &[DeviceInfo], index: usize) -> Result<usize, SelectionError> {
    let device = devices.get(index).ok_or_else(|| SelectionError::OutOfRange {
        index: index.to_string(),
        count: devices.len(),
    })?;

    if !device.is_input() {
        return Err(SelectionError::NoInputChannels(index));
    }

    Ok(index)
}

/// Parse one entered id. Integers that are negative or too large for an
/// index are out of range rather than "not a number".
fn parse_index(devices: &[DeviceInfo], entry: &str) -> Result<usize, SelectionError> {
    match entry.parse::<usize>() {
        Ok(index) => check_index(devices, index),
        Err(_) if is_integer(entry) => Err(SelectionError::OutOfRange {
            index: entry.to_string(),
            count: devices.len(),
        }),
        Err(_) => Err(SelectionError::NotANumber(entry.to_string())),
    }
}

fn is_integer(entry: &str) -> bool {
    let digits = entry
        .strip_prefix('-')
        .or_else(|| entry.strip_prefix('+'))
        .unwrap_or(entry);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Outcome of one line of input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    Finish,
    Toggled { index: usize, selected: bool },
    Rejected(SelectionError),
}

pub struct DeviceSelector<'a> {
    devices: &'a [DeviceInfo],
    selection: Selection,
}

impl<'a> DeviceSelector<'a> {
    pub fn new(devices: &'a [DeviceInfo]) -> Self {
        Self {
            devices,
            selection: Selection::new(),
        }
    }

    pub fn selection(&self) -> &Selection {
        &self.selection
    }

    /// Apply one line of user input
    pub fn apply(&mut self, line: &str) -> Step {
        let line = line.trim();
        if line.is_empty() {
            return Step::Finish;
        }

        match parse_index(self.devices, line) {
            Ok(index) => Step::Toggled {
                index,
                selected: self.selection.toggle(index),
            },
            Err(e) => Step::Rejected(e),
        }
    }

    /// Print the prompt and every input device with its selection marker
    pub fn render<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "{}", PROMPT)?;
        for device in self.devices.iter().filter(|d| d.is_input()) {
            let marker = if self.selection.contains(device.index) {
                "✅"
            } else {
                "❌"
            };
            writeln!(
                out,
                "{} Input Device id {:>3} - {}",
                marker, device.index, device.name
            )?;
        }
        out.flush()
    }

    /// Prompt until the user finishes, returning the selection
    pub fn run<R: BufRead, W: Write>(
        mut self,
        mut input: R,
        out: &mut W,
    ) -> io::Result<Selection> {
        if !self.devices.iter().any(DeviceInfo::is_input) {
            writeln!(out, "No input devices found")?;
            return Ok(self.selection);
        }

        let mut line = String::new();
        loop {
            self.render(out)?;

            line.clear();
            if input.read_line(&mut line)? == 0 {
                break;
            }

            match self.apply(&line) {
                Step::Finish => break,
                Step::Toggled { .. } => {}
                Step::Rejected(reason) => writeln!(out, "Rejected: {}", reason)?,
            }
        }

        Ok(self.selection)
    }
}
