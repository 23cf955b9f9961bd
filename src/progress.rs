//! Live per-transport progress lines.
//!
//! Every transport gets one terminal row, created the first time an outcome is
//! reported for it. Rows are addressed relative to the bottom of the output:
//! the cursor always rests one row below the newest line, so a line created
//! `k`-th sits `row_count - k` rows above it. Finding or creating the line,
//! counting the outcome and redrawing the row all happen under one lock.

use std::io::{self, Write};

use parking_lot::Mutex;

pub const BAR_WIDTH: usize = 25;

const FILLED: char = '■';
const SUCCESS_STYLE: &str = "\x1b[38;5;118m";
const FAILURE_STYLE: &str = "\x1b[38;5;196m";
const RESET: &str = "\x1b[m";

/// Progress of one transport's sweep
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineState {
    pub transport: String,
    pub display_offset: usize,
    pub success_count: usize,
    pub failure_count: usize,
    pub total_expected: usize,
}

impl LineState {
    fn new(transport: &str, display_offset: usize, total_expected: usize) -> Self {
        LineState {
            transport: transport.to_string(),
            display_offset,
            success_count: 0,
            failure_count: 0,
            total_expected,
        }
    }

    pub fn completed(&self) -> usize {
        self.success_count + self.failure_count
    }

    /// Bar cells to fill: `ceil(completed / total * 25)`, capped at the bar width.
    /// An empty sweep counts as complete.
    pub fn filled_cells(&self) -> usize {
        if self.total_expected == 0 {
            return BAR_WIDTH;
        }
        let cells = (self.completed() * BAR_WIDTH).div_ceil(self.total_expected);
        cells.min(BAR_WIDTH)
    }

    /// Percentage shown next to the bar, in steps of one cell (4%)
    pub fn percent(&self) -> usize {
        self.filled_cells() * 100 / BAR_WIDTH
    }
}

/// Insertion-ordered, append-only table of progress lines
#[derive(Debug, Default)]
pub struct ProgressTable {
    lines: Vec<LineState>,
}

impl ProgressTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome for `transport`, creating its line on first sight.
    /// Returns the index of the line.
    pub fn tally(&mut self, transport: &str, total_expected: usize, success: bool) -> usize {
        let index = match self.lines.iter().position(|l| l.transport == transport) {
            Some(index) => index,
            None => {
                let offset = self.lines.len();
                self.lines.push(LineState::new(transport, offset, total_expected));
                offset
            }
        };

        let line = &mut self.lines[index];
        if success {
            line.success_count += 1;
        } else {
            line.failure_count += 1;
        }

        index
    }

    #[cfg(test)]
    pub fn get(&self, transport: &str) -> Option<&LineState> {
        self.lines.iter().find(|l| l.transport == transport)
    }

    pub fn line(&self, index: usize) -> &LineState {
        &self.lines[index]
    }

    #[cfg(test)]
    pub fn lines(&self) -> &[LineState] {
        &self.lines
    }
}

/// Visible text of a progress line, without cursor movement
pub fn render_line(line: &LineState) -> String {
    let filled = line.filled_cells();
    let bar: String = std::iter::repeat(FILLED)
        .take(filled)
        .chain(std::iter::repeat(' ').take(BAR_WIDTH - filled))
        .collect();

    format!(
        "{:<8} [{}] {:>3}% {}S{}:{:>3} {}F{}: {}",
        line.transport,
        bar,
        line.percent(),
        SUCCESS_STYLE,
        RESET,
        line.success_count,
        FAILURE_STYLE,
        RESET,
        line.failure_count
    )
}

/// Escape sequence that redraws `line` `rows_up` rows above the cursor and returns
pub fn redraw_sequence(rows_up: usize, line: &LineState) -> String {
    format!(
        "\x1b[{rows}A\x1b[2K\r{text}\x1b[{rows}B\r",
        rows = rows_up,
        text = render_line(line)
    )
}

struct Screen<W> {
    table: ProgressTable,
    out: W,
    // Blank rows actually written; trails the table only after a failed write
    rows: usize,
}

impl<W: Write> Screen<W> {
    /// Make sure rows exist down to the line at `display_offset`
    fn reserve_rows(&mut self, display_offset: usize) -> io::Result<()> {
        while self.rows <= display_offset {
            self.out.write_all(b"\n")?;
            self.rows += 1;
        }
        Ok(())
    }
}

/// Shared owner of the progress table and the terminal it is drawn on
pub struct Multiplexer<W: Write = io::Stdout> {
    display: bool,
    screen: Mutex<Screen<W>>,
}

impl Multiplexer<io::Stdout> {
    pub fn stdout(display: bool) -> Self {
        Self::new(io::stdout(), display)
    }
}

impl<W: Write> Multiplexer<W> {
    pub fn new(out: W, display: bool) -> Self {
        Multiplexer {
            display,
            screen: Mutex::new(Screen {
                table: ProgressTable::new(),
                out,
                rows: 0,
            }),
        }
    }

    /// Record one outcome for `transport` and redraw its line.
    ///
    /// `total_expected` is only read when the line is created. Counters are
    /// updated even if writing to the terminal fails; the error is returned.
    /// A row whose blank line could not be written is emitted again by the
    /// next call that needs it, so offsets of later lines stay aligned.
    pub fn record(
        &self,
        transport: &str,
        total_expected: usize,
        success: bool,
    ) -> io::Result<()> {
        let mut screen = self.screen.lock();

        let index = screen.table.tally(transport, total_expected, success);
        if !self.display {
            return Ok(());
        }

        let display_offset = screen.table.line(index).display_offset;
        screen.reserve_rows(display_offset)?;

        let Screen { table, out, rows } = &mut *screen;
        let sequence = redraw_sequence(*rows - display_offset, table.line(index));
        out.write_all(sequence.as_bytes())?;
        out.flush()
    }

    /// Copy of the line for `transport`, if one has been created
    #[cfg(test)]
    pub fn line(&self, transport: &str) -> Option<LineState> {
        self.screen.lock().table.get(transport).cloned()
    }

    #[cfg(test)]
    pub fn lines(&self) -> Vec<LineState> {
        self.screen.lock().table.lines().to_vec()
    }

    /// Take the output back, e.g. to inspect what was drawn
    #[cfg(test)]
    pub fn into_inner(self) -> W {
        self.screen.into_inner().out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Barrier};
    use std::thread;

    fn line(success: usize, failure: usize, total: usize) -> LineState {
        LineState {
            transport: "udp".to_string(),
            display_offset: 0,
            success_count: success,
            failure_count: failure,
            total_expected: total,
        }
    }

    fn strip_styles(text: &str) -> String {
        text.replace(SUCCESS_STYLE, "")
            .replace(FAILURE_STYLE, "")
            .replace(RESET, "")
    }

    #[test]
    fn test_scenario_four_successes_two_failures() {
        let mut table = ProgressTable::new();
        for success in [true, true, false, true, false, true] {
            table.tally("udp", 6, success);
        }

        let state = table.get("udp").unwrap();
        assert_eq!(state.success_count, 4);
        assert_eq!(state.failure_count, 2);
        assert_eq!(state.filled_cells(), 25);
        assert_eq!(state.percent(), 100);
    }

    #[test]
    fn test_all_failures_still_complete() {
        let mut table = ProgressTable::new();
        for _ in 0..30 {
            table.tally("tcp", 30, false);
        }

        let state = table.get("tcp").unwrap();
        assert_eq!(state.success_count, 0);
        assert_eq!(state.failure_count, 30);
        assert_eq!(state.percent(), 100);
    }

    #[test]
    fn test_filled_cells_round_up() {
        assert_eq!(line(0, 0, 30).filled_cells(), 0);
        assert_eq!(line(1, 0, 30).filled_cells(), 1);
        assert_eq!(line(6, 0, 30).filled_cells(), 5);
        assert_eq!(line(6, 0, 30).percent(), 20);
        assert_eq!(line(1, 0, 24).filled_cells(), 2);
        assert_eq!(line(0, 0, 0).filled_cells(), BAR_WIDTH);
        assert_eq!(line(40, 0, 30).filled_cells(), BAR_WIDTH);
    }

    #[test]
    fn test_percent_never_decreases() {
        let mut table = ProgressTable::new();
        let mut last = 0;
        for i in 0..24 {
            table.tally("tcp-tls", 24, i % 3 == 0);
            let percent = table.get("tcp-tls").unwrap().percent();
            assert!(percent >= last);
            last = percent;
        }
        assert_eq!(last, 100);
    }

    #[test]
    fn test_offsets_follow_first_sight() {
        let mut table = ProgressTable::new();
        assert_eq!(table.tally("tcp", 30, true), 0);
        assert_eq!(table.tally("udp", 30, true), 1);
        assert_eq!(table.tally("tcp", 30, false), 0);
        assert_eq!(table.tally("tcp-tls", 24, true), 2);

        let offsets: Vec<_> = table.lines().iter().map(|l| l.display_offset).collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_total_fixed_at_creation() {
        let mut table = ProgressTable::new();
        table.tally("udp", 30, true);
        table.tally("udp", 99, true);
        assert_eq!(table.get("udp").unwrap().total_expected, 30);
    }

    #[test]
    fn test_render_line_layout() {
        let text = strip_styles(&render_line(&line(4, 2, 12)));
        let bar = format!("{}{}", "■".repeat(13), " ".repeat(12));
        assert_eq!(text, format!("udp      [{}]  52% S:  4 F: 2", bar));
    }

    #[test]
    fn test_render_line_styles_counters() {
        let text = render_line(&line(1, 1, 2));
        assert!(text.contains("\x1b[38;5;118mS\x1b[m:"));
        assert!(text.contains("\x1b[38;5;196mF\x1b[m:"));
    }

    #[test]
    fn test_redraw_is_idempotent() {
        let state = line(3, 1, 30);
        assert_eq!(redraw_sequence(2, &state), redraw_sequence(2, &state));
        assert_eq!(render_line(&state), render_line(&state.clone()));
    }

    #[test]
    fn test_redraw_sequence_moves_and_returns() {
        let sequence = redraw_sequence(3, &line(1, 0, 30));
        assert!(sequence.starts_with("\x1b[3A\x1b[2K\r"));
        assert!(sequence.ends_with("\x1b[3B\r"));
    }

    #[test]
    fn test_record_output() {
        let mux = Multiplexer::new(Vec::new(), true);
        mux.record("udp", 6, true).unwrap();
        mux.record("tcp", 6, false).unwrap();
        mux.record("udp", 6, true).unwrap();

        let out = String::from_utf8(mux.into_inner()).unwrap();
        let udp_first = render_line(&line(1, 0, 6));
        let mut tcp = line(0, 1, 6);
        tcp.transport = "tcp".to_string();
        tcp.display_offset = 1;
        let udp_second = render_line(&line(2, 0, 6));

        let expected = format!(
            "\n\x1b[1A\x1b[2K\r{}\x1b[1B\r\n\x1b[1A\x1b[2K\r{}\x1b[1B\r\x1b[2A\x1b[2K\r{}\x1b[2B\r",
            udp_first,
            render_line(&tcp),
            udp_second
        );
        assert_eq!(out, expected);
    }

    /// Rejects the first write, accepts everything after it
    struct FlakyWriter {
        failed: bool,
        buf: Vec<u8>,
    }

    impl Write for FlakyWriter {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            if !self.failed {
                self.failed = true;
                return Err(io::Error::other("terminal gone"));
            }
            self.buf.extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_row_creation_is_retried() {
        let mux = Multiplexer::new(
            FlakyWriter {
                failed: false,
                buf: Vec::new(),
            },
            true,
        );
        assert!(mux.record("udp", 6, true).is_err());
        mux.record("tcp", 6, false).unwrap();
        mux.record("udp", 6, true).unwrap();

        assert_eq!(mux.line("udp").unwrap().completed(), 2);

        let mut tcp = line(0, 1, 6);
        tcp.transport = "tcp".to_string();
        tcp.display_offset = 1;
        let expected = format!(
            "\n\n{}{}",
            redraw_sequence(1, &tcp),
            redraw_sequence(2, &line(2, 0, 6))
        );

        let out = mux.into_inner().buf;
        assert_eq!(String::from_utf8(out).unwrap(), expected);
    }

    #[test]
    fn test_record_without_display_counts_silently() {
        let mux = Multiplexer::new(Vec::new(), false);
        mux.record("udp", 2, true).unwrap();
        mux.record("udp", 2, false).unwrap();

        let state = mux.line("udp").unwrap();
        assert_eq!(state.completed(), 2);
        assert!(mux.into_inner().is_empty());
    }

    #[test]
    fn test_concurrent_records_lose_nothing() {
        const PER_TRANSPORT: usize = 500;
        let mux = Arc::new(Multiplexer::new(Vec::new(), true));
        let transports = ["udp", "tcp", "tcp-tls"];
        let barrier = Arc::new(Barrier::new(transports.len()));

        let handles: Vec<_> = transports
            .iter()
            .map(|&transport| {
                let mux = mux.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..PER_TRANSPORT {
                        mux.record(transport, PER_TRANSPORT, i % 2 == 0).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let lines = mux.lines();
        assert_eq!(lines.len(), 3);
        for state in &lines {
            assert_eq!(state.completed(), PER_TRANSPORT);
            assert_eq!(state.success_count, PER_TRANSPORT / 2);
        }

        let mut offsets: Vec<_> = lines.iter().map(|l| l.display_offset).collect();
        offsets.sort();
        assert_eq!(offsets, vec![0, 1, 2]);

        // One blank row per line, no more
        let mux = Arc::try_unwrap(mux).ok().unwrap();
        let out = String::from_utf8(mux.into_inner()).unwrap();
        assert_eq!(out.matches('\n').count(), 3);
    }

    #[test]
    fn test_concurrent_first_reports_get_distinct_offsets() {
        for _ in 0..50 {
            let mux = Arc::new(Multiplexer::new(io::sink(), true));
            let barrier = Arc::new(Barrier::new(2));

            let handles: Vec<_> = ["udp", "tcp"]
                .into_iter()
                .map(|transport| {
                    let mux = mux.clone();
                    let barrier = barrier.clone();
                    thread::spawn(move || {
                        barrier.wait();
                        mux.record(transport, 1, true).unwrap();
                    })
                })
                .collect();
            for handle in handles {
                handle.join().unwrap();
            }

            let mut offsets: Vec<_> = mux.lines().iter().map(|l| l.display_offset).collect();
            offsets.sort();
            assert_eq!(offsets, vec![0, 1]);
        }
    }

    #[test]
    fn test_offsets_stable_as_lines_appear() {
        let mux = Multiplexer::new(io::sink(), true);
        mux.record("tcp", 10, true).unwrap();
        let before = mux.line("tcp").unwrap().display_offset;

        mux.record("udp", 10, true).unwrap();
        mux.record("tcp-tls", 10, true).unwrap();
        mux.record("tcp", 10, true).unwrap();

        assert_eq!(mux.line("tcp").unwrap().display_offset, before);
        assert_eq!(mux.line("tcp-tls").unwrap().display_offset, 2);
    }
}
