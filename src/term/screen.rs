//! In-memory screen model: a fixed grid of cells plus cursor and pen state.
//!
//! The grid is mutated only by the VT parser. Rows evicted off the top by
//! scrolling are retained in a bounded FIFO scrollback.

use std::collections::VecDeque;

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

pub const DEFAULT_SCROLLBACK: usize = 2000;

const ZERO_WIDTH_JOINER: char = '\u{200D}';
const VARIATION_SELECTOR_16: char = '\u{FE0F}';

bitflags! {
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct AttrFlags: u8 {
        const BOLD      = 0b0000_0001;
        const DIM       = 0b0000_0010;
        const ITALIC    = 0b0000_0100;
        const UNDERLINE = 0b0000_1000;
        const INVERSE   = 0b0001_0000;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

/// Current drawing attributes applied to newly written cells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pen {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl Pen {
    pub fn reset(&mut self) {
        *self = Pen::default();
    }
}

/// A single grid position. An empty grapheme renders as a space; width 0
/// marks the continuation slot to the right of a double-width glyph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub grapheme: String,
    pub width: u8,
    pub pen: Pen,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            pen: Pen::default(),
        }
    }
}

impl Cell {
    fn blank(pen: Pen) -> Self {
        Self {
            grapheme: String::new(),
            width: 1,
            pen,
        }
    }

    fn continuation(pen: Pen) -> Self {
        Self {
            grapheme: String::new(),
            width: 0,
            pen,
        }
    }

    pub fn is_continuation(&self) -> bool {
        self.width == 0
    }

    /// The text shown for this cell; blank cells render as a space.
    pub fn display(&self) -> &str {
        if self.grapheme.is_empty() {
            " "
        } else {
            &self.grapheme
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    fn new(cols: u16, pen: Pen) -> Self {
        Self {
            cells: vec![Cell::blank(pen); cols as usize],
        }
    }

    fn resize(&mut self, cols: u16) {
        // A wide glyph whose continuation slot is cut off must not survive
        // as a half glyph.
        self.cells.resize(cols as usize, Cell::default());
        if let Some(last) = self.cells.last_mut() {
            if last.width == 2 {
                *last = Cell::blank(last.pen);
            }
        }
        if let Some(first) = self.cells.first_mut() {
            if first.is_continuation() {
                *first = Cell::blank(first.pen);
            }
        }
    }

    /// Plain text of the row, continuation slots skipped.
    pub fn text(&self) -> String {
        self.cells
            .iter()
            .filter(|cell| !cell.is_continuation())
            .map(Cell::display)
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct SavedCursor {
    col: u16,
    row: u16,
    pen: Option<Pen>,
}

/// Fixed-size grid with cursor, pen, wrap-pending flag, and FIFO scrollback.
pub struct ScreenBuffer {
    cols: u16,
    rows: u16,
    grid: Vec<Row>,
    scrollback: VecDeque<Row>,
    scrollback_limit: usize,
    cursor_col: u16,
    cursor_row: u16,
    saved: Option<SavedCursor>,
    pen: Pen,
    wrap_pending: bool,
    join_pending: bool,
}

impl ScreenBuffer {
    pub fn new(cols: u16, rows: u16) -> Self {
        Self::with_scrollback(cols, rows, DEFAULT_SCROLLBACK)
    }

    pub fn with_scrollback(cols: u16, rows: u16, scrollback_limit: usize) -> Self {
        let cols = cols.max(1);
        let rows = rows.max(1);
        Self {
            cols,
            rows,
            grid: (0..rows).map(|_| Row::new(cols, Pen::default())).collect(),
            scrollback: VecDeque::new(),
            scrollback_limit,
            cursor_col: 0,
            cursor_row: 0,
            saved: None,
            pen: Pen::default(),
            wrap_pending: false,
            join_pending: false,
        }
    }

    pub fn cols(&self) -> u16 {
        self.cols
    }

    pub fn rows(&self) -> u16 {
        self.rows
    }

    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor_col, self.cursor_row)
    }

    pub fn wrap_pending(&self) -> bool {
        self.wrap_pending
    }

    pub fn pen(&self) -> Pen {
        self.pen
    }

    pub fn pen_mut(&mut self) -> &mut Pen {
        &mut self.pen
    }

    pub fn row(&self, row: u16) -> Option<&Row> {
        self.grid.get(row as usize)
    }

    pub fn cell(&self, col: u16, row: u16) -> Option<&Cell> {
        self.grid.get(row as usize)?.cells.get(col as usize)
    }

    pub fn scrollback_len(&self) -> usize {
        self.scrollback.len()
    }

    /// Resize the grid, clamping the cursor back into bounds.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        let cols = cols.max(1);
        let rows = rows.max(1);
        self.cols = cols;
        while self.grid.len() < rows as usize {
            self.grid.push(Row::new(cols, Pen::default()));
        }
        self.grid.truncate(rows as usize);
        for row in &mut self.grid {
            row.resize(cols);
        }
        for row in &mut self.scrollback {
            row.resize(cols);
        }
        self.rows = rows;
        self.cursor_col = self.cursor_col.min(cols - 1);
        self.cursor_row = self.cursor_row.min(rows - 1);
        self.wrap_pending = false;
        self.join_pending = false;
    }

    /// Write one decoded code point at the cursor. Zero-width code points
    /// coalesce into the previously written cell; VS16 and ZWJ widen it to
    /// two columns.
    pub fn put_char(&mut self, ch: char) {
        let width = ch.width().unwrap_or(0);
        if width == 0 {
            self.put_zero_width(ch);
            return;
        }
        if self.join_pending {
            self.join_pending = false;
            self.append_to_last_cell(ch, true);
            return;
        }

        if self.wrap_pending {
            self.wrap_pending = false;
            self.cursor_col = 0;
            self.linefeed();
        }
        // A double-width glyph never fits in the last column alone; it wraps
        // whole to the next row instead of truncating.
        if width == 2 && self.cursor_col + 1 >= self.cols {
            self.cursor_col = 0;
            self.linefeed();
        }

        let col = self.cursor_col as usize;
        let row = self.cursor_row as usize;
        // A wide pair is a single occupied slot: writing into its
        // continuation half replaces the pair in place, without advancing.
        let into_continuation = self.grid[row].cells[col].is_continuation();
        self.clear_overlapped_glyph(col, row);

        let pen = self.pen;
        self.grid[row].cells[col] = Cell {
            grapheme: ch.to_string(),
            width: width as u8,
            pen,
        };
        if width == 2 {
            self.clear_overlapped_glyph(col + 1, row);
            self.grid[row].cells[col + 1] = Cell::continuation(pen);
        }
        if into_continuation {
            return;
        }

        let advanced = self.cursor_col + width as u16;
        if advanced >= self.cols {
            self.cursor_col = self.cols - 1;
            self.wrap_pending = true;
        } else {
            self.cursor_col = advanced;
        }
    }

    fn put_zero_width(&mut self, ch: char) {
        match ch {
            ZERO_WIDTH_JOINER => {
                if self.append_to_last_cell(ch, false) {
                    self.join_pending = true;
                }
            }
            VARIATION_SELECTOR_16 => {
                // Emoji presentation: the base glyph becomes double width.
                if self.append_to_last_cell(ch, false) {
                    self.widen_last_cell();
                }
            }
            _ => {
                self.append_to_last_cell(ch, false);
            }
        }
    }

    /// Locate the most recently written cell (left of the cursor, stepping
    /// over a continuation slot) and append `ch` to its grapheme.
    fn append_to_last_cell(&mut self, ch: char, widen: bool) -> bool {
        let row = self.cursor_row as usize;
        let mut col = if self.wrap_pending {
            self.cursor_col as usize
        } else if self.cursor_col == 0 {
            return false;
        } else {
            self.cursor_col as usize - 1
        };
        if self.grid[row].cells[col].is_continuation() {
            if col == 0 {
                return false;
            }
            col -= 1;
        }
        if self.grid[row].cells[col].grapheme.is_empty() {
            return false;
        }
        self.grid[row].cells[col].grapheme.push(ch);
        if widen {
            self.widen_cell(col, row);
        }
        true
    }

    fn widen_last_cell(&mut self) {
        let row = self.cursor_row as usize;
        let mut col = if self.wrap_pending {
            self.cursor_col as usize
        } else {
            (self.cursor_col as usize).saturating_sub(1)
        };
        if self.grid[row].cells[col].is_continuation() && col > 0 {
            col -= 1;
        }
        self.widen_cell(col, row);
    }

    fn widen_cell(&mut self, col: usize, row: usize) {
        if self.grid[row].cells[col].width != 1 {
            return;
        }
        // Nowhere to place the continuation slot at the right edge; the cell
        // stays narrow.
        if col + 1 >= self.cols as usize {
            return;
        }
        self.clear_overlapped_glyph(col + 1, row);
        let pen = self.grid[row].cells[col].pen;
        self.grid[row].cells[col].width = 2;
        self.grid[row].cells[col + 1] = Cell::continuation(pen);
        if !self.wrap_pending {
            let advanced = col as u16 + 2;
            if advanced >= self.cols {
                self.cursor_col = self.cols - 1;
                self.wrap_pending = true;
            } else {
                self.cursor_col = advanced;
            }
        }
    }

    /// Overwriting either half of a double-width glyph blanks the other half
    /// so no orphaned continuation or half glyph survives.
    fn clear_overlapped_glyph(&mut self, col: usize, row: usize) {
        let cells = &mut self.grid[row].cells;
        if col >= cells.len() {
            return;
        }
        if cells[col].is_continuation() && col > 0 && cells[col - 1].width == 2 {
            cells[col - 1] = Cell::blank(cells[col - 1].pen);
        }
        if cells[col].width == 2 && col + 1 < cells.len() {
            cells[col + 1] = Cell::blank(cells[col + 1].pen);
        }
    }

    pub fn carriage_return(&mut self) {
        self.cursor_col = 0;
        self.cancel_pending();
    }

    pub fn linefeed(&mut self) {
        self.cancel_pending();
        if self.cursor_row + 1 >= self.rows {
            self.scroll_up();
        } else {
            self.cursor_row += 1;
        }
    }

    pub fn backspace(&mut self) {
        self.cursor_col = self.cursor_col.saturating_sub(1);
        self.cancel_pending();
    }

    pub fn horizontal_tab(&mut self) {
        self.cancel_pending();
        let next = (self.cursor_col / 8 + 1) * 8;
        self.cursor_col = next.min(self.cols - 1);
    }

    /// Discard row 0 into scrollback and open a blank row (current pen) at
    /// the bottom.
    fn scroll_up(&mut self) {
        let evicted = self.grid.remove(0);
        self.scrollback.push_back(evicted);
        while self.scrollback.len() > self.scrollback_limit {
            self.scrollback.pop_front();
        }
        self.grid.push(Row::new(self.cols, self.pen));
    }

    pub fn cursor_up(&mut self, n: u16) {
        self.cursor_row = self.cursor_row.saturating_sub(n.max(1));
        self.cancel_pending();
    }

    pub fn cursor_down(&mut self, n: u16) {
        self.cursor_row = (self.cursor_row + n.max(1)).min(self.rows - 1);
        self.cancel_pending();
    }

    pub fn cursor_forward(&mut self, n: u16) {
        self.cursor_col = (self.cursor_col + n.max(1)).min(self.cols - 1);
        self.cancel_pending();
    }

    pub fn cursor_backward(&mut self, n: u16) {
        self.cursor_col = self.cursor_col.saturating_sub(n.max(1));
        self.cancel_pending();
    }

    /// Absolute move with 1-based parameters; zero or missing means 1.
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.cursor_row = row.max(1).saturating_sub(1).min(self.rows - 1);
        self.cursor_col = col.max(1).saturating_sub(1).min(self.cols - 1);
        self.cancel_pending();
    }

    fn cancel_pending(&mut self) {
        self.wrap_pending = false;
        self.join_pending = false;
    }

    /// Erase in display. Erased cells become blank width-1 cells with the
    /// default pen.
    pub fn erase_in_display(&mut self, mode: u16) {
        self.cancel_pending();
        let row = self.cursor_row as usize;
        match mode {
            0 => {
                self.erase_in_line(0);
                for r in row + 1..self.rows as usize {
                    self.blank_row(r);
                }
            }
            1 => {
                for r in 0..row {
                    self.blank_row(r);
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                for r in 0..self.rows as usize {
                    self.blank_row(r);
                }
            }
            _ => {}
        }
    }

    pub fn erase_in_line(&mut self, mode: u16) {
        self.cancel_pending();
        let row = self.cursor_row as usize;
        let col = self.cursor_col as usize;
        let range = match mode {
            0 => col..self.cols as usize,
            1 => 0..col + 1,
            2 => 0..self.cols as usize,
            _ => return,
        };
        for c in range {
            self.clear_overlapped_glyph(c, row);
            self.grid[row].cells[c] = Cell::default();
        }
    }

    fn blank_row(&mut self, row: usize) {
        for cell in &mut self.grid[row].cells {
            *cell = Cell::default();
        }
    }

    pub fn save_cursor(&mut self, include_pen: bool) {
        self.saved = Some(SavedCursor {
            col: self.cursor_col,
            row: self.cursor_row,
            pen: include_pen.then_some(self.pen),
        });
    }

    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.saved {
            self.cursor_col = saved.col.min(self.cols - 1);
            self.cursor_row = saved.row.min(self.rows - 1);
            if let Some(pen) = saved.pen {
                self.pen = pen;
            }
            self.cancel_pending();
        }
    }

    /// How far back the view may be scrolled.
    pub fn max_view_offset(&self) -> usize {
        self.scrollback.len()
    }

    /// Render a window of `rows` lines ending `offset` rows above the live
    /// bottom, as strings of SGR runs.
    pub fn render_lines(&self, offset: usize) -> Vec<String> {
        let offset = offset.min(self.scrollback.len());
        let total = self.scrollback.len() + self.grid.len();
        let end = total - offset;
        let start = end.saturating_sub(self.rows as usize);
        (start..end)
            .map(|index| {
                let row = if index < self.scrollback.len() {
                    &self.scrollback[index]
                } else {
                    &self.grid[index - self.scrollback.len()]
                };
                render_row(row)
            })
            .collect()
    }
}

fn render_row(row: &Row) -> String {
    let mut out = String::new();
    let mut current: Option<Pen> = None;
    for cell in &row.cells {
        if cell.is_continuation() {
            continue;
        }
        if current != Some(cell.pen) {
            out.push_str(&sgr_sequence(cell.pen));
            current = Some(cell.pen);
        }
        out.push_str(cell.display());
    }
    out.push_str("\x1b[0m");
    out
}

/// SGR run that reproduces `pen` from a reset state.
fn sgr_sequence(pen: Pen) -> String {
    let mut seq = String::from("\x1b[0");
    if pen.flags.contains(AttrFlags::BOLD) {
        seq.push_str(";1");
    }
    if pen.flags.contains(AttrFlags::DIM) {
        seq.push_str(";2");
    }
    if pen.flags.contains(AttrFlags::ITALIC) {
        seq.push_str(";3");
    }
    if pen.flags.contains(AttrFlags::UNDERLINE) {
        seq.push_str(";4");
    }
    if pen.flags.contains(AttrFlags::INVERSE) {
        seq.push_str(";7");
    }
    match pen.fg {
        Color::Default => {}
        Color::Indexed(n) => seq.push_str(&format!(";38;5;{n}")),
        Color::Rgb(r, g, b) => seq.push_str(&format!(";38;2;{r};{g};{b}")),
    }
    match pen.bg {
        Color::Default => {}
        Color::Indexed(n) => seq.push_str(&format!(";48;5;{n}")),
        Color::Rgb(r, g, b) => seq.push_str(&format!(";48;2;{r};{g};{b}")),
    }
    seq.push('m');
    seq
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tab_advances_to_next_stop() {
        let mut screen = ScreenBuffer::new(40, 4);
        screen.put_char('a');
        screen.horizontal_tab();
        assert_eq!(screen.cursor(), (8, 0));
        screen.horizontal_tab();
        assert_eq!(screen.cursor(), (16, 0));
    }

    #[test]
    fn tab_clamps_at_right_edge() {
        let mut screen = ScreenBuffer::new(10, 4);
        screen.cursor_position(1, 9);
        screen.horizontal_tab();
        assert_eq!(screen.cursor(), (9, 0));
    }

    #[test]
    fn wrap_pending_defers_cursor_motion() {
        let mut screen = ScreenBuffer::new(4, 2);
        for ch in "abcd".chars() {
            screen.put_char(ch);
        }
        assert_eq!(screen.cursor(), (3, 0));
        assert!(screen.wrap_pending());
        screen.put_char('e');
        assert_eq!(screen.cursor(), (1, 1));
        assert_eq!(screen.cell(0, 1).unwrap().grapheme, "e");
    }

    #[test]
    fn scroll_moves_top_row_into_scrollback() {
        let mut screen = ScreenBuffer::with_scrollback(4, 2, 8);
        screen.put_char('x');
        screen.carriage_return();
        screen.linefeed();
        screen.put_char('y');
        screen.carriage_return();
        screen.linefeed();
        assert_eq!(screen.scrollback_len(), 1);
        assert_eq!(screen.row(0).unwrap().text().trim_end(), "y");
    }

    #[test]
    fn scrollback_eviction_is_fifo() {
        let mut screen = ScreenBuffer::with_scrollback(4, 2, 3);
        for i in 0..8 {
            screen.put_char(char::from(b'0' + i));
            screen.carriage_return();
            screen.linefeed();
        }
        assert_eq!(screen.scrollback_len(), 3);
    }

    #[test]
    fn erase_in_line_uses_default_pen() {
        let mut screen = ScreenBuffer::new(8, 2);
        screen.pen_mut().flags |= AttrFlags::BOLD;
        for ch in "abcdef".chars() {
            screen.put_char(ch);
        }
        screen.cursor_position(1, 3);
        screen.erase_in_line(0);
        let cell = screen.cell(4, 0).unwrap();
        assert_eq!(cell.grapheme, "");
        assert_eq!(cell.pen, Pen::default());
        assert_eq!(screen.cell(1, 0).unwrap().grapheme, "b");
    }

    #[test]
    fn every_row_width_sums_to_cols() {
        let mut screen = ScreenBuffer::new(10, 4);
        for ch in "a🐛b❤\u{FE0F}c🦀🦀🦀".chars() {
            screen.put_char(ch);
        }
        for r in 0..screen.rows() {
            let sum: u32 = screen
                .row(r)
                .unwrap()
                .cells
                .iter()
                .map(|cell| u32::from(cell.width))
                .sum();
            assert_eq!(sum, 10, "row {r} widths");
        }
    }

    #[test]
    fn render_lines_reports_pen_runs() {
        let mut screen = ScreenBuffer::new(6, 2);
        screen.pen_mut().fg = Color::Indexed(1);
        screen.put_char('r');
        let lines = screen.render_lines(0);
        assert!(lines[0].contains("\x1b[0;38;5;1m"));
        assert!(lines[0].ends_with("\x1b[0m"));
    }
}
