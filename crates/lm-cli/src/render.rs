//! Live terminal rendering of split deltas.

use std::io::{self, Write};

use crossterm::style::Stylize;

use lm_core::SplitDelta;

const THINKING_HEADER: &str = "Thinking";
const SEPARATOR: &str = "────────";

/// Writes thinking and response deltas as they arrive.
///
/// Thinking text is printed under a header and, with colour enabled,
/// dimmed; a separator follows once the thinking block closes.
pub struct TerminalRenderer<W: Write> {
    out: W,
    show_thinking: bool,
    color: bool,
    in_thinking_block: bool,
    at_line_start: bool,
    wrote_anything: bool,
}

impl<W: Write> TerminalRenderer<W> {
    pub fn new(out: W, show_thinking: bool, color: bool) -> Self {
        Self {
            out,
            show_thinking,
            color,
            in_thinking_block: false,
            at_line_start: true,
            wrote_anything: false,
        }
    }

    pub fn render(&mut self, delta: &SplitDelta) -> io::Result<()> {
        if self.show_thinking && !delta.thinking.is_empty() {
            if !self.in_thinking_block {
                self.start_line()?;
                let header = format!("{}:", THINKING_HEADER);
                if self.color {
                    writeln!(self.out, "{}", header.as_str().bold().dim())?;
                } else {
                    writeln!(self.out, "{}", header)?;
                }
                self.in_thinking_block = true;
                self.at_line_start = true;
            }

            if self.color {
                write!(self.out, "{}", delta.thinking.as_str().dim())?;
            } else {
                write!(self.out, "{}", delta.thinking)?;
            }
            self.track(&delta.thinking);
        }

        if delta.thinking_closed && self.in_thinking_block {
            self.start_line()?;
            if self.color {
                writeln!(self.out, "{}", SEPARATOR.dim())?;
            } else {
                writeln!(self.out, "{}", SEPARATOR)?;
            }
            self.in_thinking_block = false;
            self.at_line_start = true;
        }

        if !delta.response.is_empty() {
            write!(self.out, "{}", delta.response)?;
            self.track(&delta.response);
        }

        self.out.flush()
    }

    /// End the output on a fresh line.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.wrote_anything && !self.at_line_start {
            writeln!(self.out)?;
            self.at_line_start = true;
        }
        self.out.flush()
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn start_line(&mut self) -> io::Result<()> {
        if !self.at_line_start {
            writeln!(self.out)?;
            self.at_line_start = true;
        }
        Ok(())
    }

    fn track(&mut self, text: &str) {
        self.wrote_anything = true;
        self.at_line_start = text.ends_with('\n');
    }
}
