//! Report sinks for join results and loaded tables.

use std::io::{self, Write};

use crate::harness::JoinOutput;
use crate::table::Table;

const CELL_WIDTH: usize = 12;
const UNSET: &str = "<unset>";

/// Receives the outcome of a join run.
pub trait ReportSink {
    fn report(&mut self, output: &JoinOutput) -> io::Result<()>;
}

/// Plain-text report: the match count, then one line per slot `1..N`,
/// then a blank line.
pub struct ConsoleReport<W: Write> {
    out: W,
}

impl<W: Write> ConsoleReport<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Every row, cells left-aligned to 12 bytes. Cell bytes are written
    /// unchanged.
    pub fn write_table(&mut self, table: &Table) -> io::Result<()> {
        for row in table.rows() {
            for cell in row {
                self.out.write_all(cell)?;
                let pad = CELL_WIDTH.saturating_sub(cell.len());
                write!(self.out, "{:pad$} ", "")?;
            }
            writeln!(self.out)?;
        }
        Ok(())
    }
}

impl ConsoleReport<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> ReportSink for ConsoleReport<W> {
    fn report(&mut self, output: &JoinOutput) -> io::Result<()> {
        writeln!(self.out, "matches: {}", output.matches)?;
        for value in output.results() {
            self.out.write_all(value.unwrap_or(UNSET.as_bytes()))?;
            writeln!(self.out)?;
        }
        writeln!(self.out)?;
        self.out.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_layout() {
        let output = JoinOutput {
            matches: 1,
            slots: vec![None, Some("Not Found".into()), None],
        };
        let mut sink = ConsoleReport::new(Vec::new());
        sink.report(&output).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, "matches: 1\nNot Found\n<unset>\n\n");
    }

    #[test]
    fn test_table_cells_are_padded() {
        let mut sink = ConsoleReport::new(Vec::new());
        sink.write_table(&Table::parse("a,bb\nccc")).unwrap();
        let text = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(text, format!("{:<12} {:<12} \n{:<12} \n", "a", "bb", "ccc"));
    }

    #[test]
    fn test_non_utf8_bytes_pass_through() {
        let output = JoinOutput {
            matches: 0,
            slots: vec![None, Some(b"caf\xe9".to_vec())],
        };
        let mut sink = ConsoleReport::new(Vec::new());
        sink.report(&output).unwrap();
        assert_eq!(sink.into_inner(), b"matches: 0\ncaf\xe9\n\n");
    }
}
