//! Grid semantics exercised through the parser: wide glyphs, emoji
//! coalescing, wrap-pending, erase, and scrollback.

use crate::term::{Cell, Color, Pen, ScreenBuffer, VtParser};

const W: u16 = 20;

fn screen_after(cols: u16, rows: u16, input: &str) -> ScreenBuffer {
    let mut screen = ScreenBuffer::new(cols, rows);
    let mut parser = VtParser::new();
    parser.feed(input.as_bytes(), &mut screen);
    screen
}

fn cell(screen: &ScreenBuffer, col: u16, row: u16) -> &Cell {
    screen.cell(col, row).expect("cell in bounds")
}

fn assert_row_widths(screen: &ScreenBuffer) {
    for r in 0..screen.rows() {
        let sum: u32 = screen
            .row(r)
            .expect("row")
            .cells
            .iter()
            .map(|c| u32::from(c.width))
            .sum();
        assert_eq!(sum, u32::from(screen.cols()), "row {r} width sum");
    }
}

#[test]
fn cursor_addressed_emoji_overwrites_cells() {
    let screen = screen_after(W, 6, "abcdefg\x1b[1;2H🐛");
    assert_eq!(cell(&screen, 0, 0).grapheme, "a");
    assert_eq!(cell(&screen, 1, 0).grapheme, "🐛");
    assert_eq!(cell(&screen, 1, 0).width, 2);
    assert!(cell(&screen, 2, 0).is_continuation());
    assert_eq!(cell(&screen, 3, 0).grapheme, "d");
    assert_eq!(screen.cursor(), (3, 0));
    assert_row_widths(&screen);
}

#[test]
fn vs16_heart_coalesces_to_width_two() {
    let screen = screen_after(W, 6, "abcdefg\x1b[1;2H❤\u{FE0F}");
    let heart = cell(&screen, 1, 0);
    assert_eq!(heart.grapheme, "❤\u{FE0F}");
    assert_eq!(heart.width, 2);
    assert!(cell(&screen, 2, 0).is_continuation());
    assert_eq!(cell(&screen, 3, 0).grapheme, "d");
    assert_eq!(screen.cursor(), (3, 0));
    assert_row_widths(&screen);
}

#[test]
fn absolute_move_into_full_row_does_not_wrap() {
    let input = format!("{}\x1b[1;5H🐛", "-".repeat(W as usize));
    let screen = screen_after(W, 6, &input);
    assert_eq!(cell(&screen, 3, 0).grapheme, "-");
    assert_eq!(cell(&screen, 4, 0).grapheme, "🐛");
    assert!(cell(&screen, 5, 0).is_continuation());
    assert_eq!(cell(&screen, 6, 0).grapheme, "-");
    // The write stayed on row 0.
    assert_eq!(screen.row(1).expect("row 1").text().trim_end(), "");
    assert_row_widths(&screen);
}

#[test]
fn leading_wide_glyph_survives_later_overwrites() {
    let input = format!("🐛{}\x1b[;5H aaron ", "-".repeat(W as usize - 2));
    let screen = screen_after(W, 6, &input);
    assert_eq!(cell(&screen, 0, 0).grapheme, "🐛");
    assert!(cell(&screen, 1, 0).is_continuation());
    for (offset, expected) in " aaron ".chars().enumerate() {
        let got = cell(&screen, 4 + offset as u16, 0);
        assert_eq!(got.display(), expected.to_string(), "col {}", 4 + offset);
    }
    assert_eq!(cell(&screen, 11, 0).grapheme, "-");
    assert_row_widths(&screen);
}

#[test]
fn overwriting_a_continuation_breaks_the_grapheme_in_place() {
    let screen = screen_after(W, 6, "❤\u{FE0F}a\x1b[2D.\n..");
    // The broken pair renders as a blank then the dot.
    assert_eq!(cell(&screen, 0, 0).display(), " ");
    assert_eq!(cell(&screen, 0, 0).width, 1);
    assert_eq!(cell(&screen, 1, 0).grapheme, ".");
    assert_eq!(cell(&screen, 2, 0).grapheme, "a");
    // LF kept the column, so the dots land at columns 1 and 2 of row 1.
    assert_eq!(cell(&screen, 1, 1).grapheme, ".");
    assert_eq!(cell(&screen, 2, 1).grapheme, ".");
    assert_eq!(cell(&screen, 0, 1).display(), " ");
    assert_eq!(screen.cursor(), (3, 1));
    assert_row_widths(&screen);
}

#[test]
fn wide_glyph_at_last_column_wraps_whole() {
    let screen = screen_after(10, 4, &format!("{}🐛", "-".repeat(9)));
    assert_eq!(cell(&screen, 9, 0).display(), " ");
    assert_eq!(cell(&screen, 0, 1).grapheme, "🐛");
    assert!(cell(&screen, 1, 1).is_continuation());
    assert_eq!(screen.cursor(), (2, 1));
    assert_row_widths(&screen);
}

#[test]
fn wrap_pending_holds_cursor_until_next_printable() {
    let screen = screen_after(10, 4, &"x".repeat(10));
    assert_eq!(screen.cursor(), (9, 0));
    assert!(screen.wrap_pending());

    let screen = screen_after(10, 4, &format!("{}y", "x".repeat(10)));
    assert_eq!(cell(&screen, 0, 1).grapheme, "y");
    assert_eq!(screen.cursor(), (1, 1));
}

#[test]
fn zwj_sequence_is_one_cell_of_width_two() {
    let screen = screen_after(W, 4, "👩\u{200D}🚒x");
    let joined = cell(&screen, 0, 0);
    assert_eq!(joined.grapheme, "👩\u{200D}🚒");
    assert_eq!(joined.width, 2);
    assert!(cell(&screen, 1, 0).is_continuation());
    assert_eq!(cell(&screen, 2, 0).grapheme, "x");
    assert_row_widths(&screen);
}

#[test]
fn combining_mark_joins_previous_cell() {
    let screen = screen_after(W, 4, "e\u{0301}x");
    assert_eq!(cell(&screen, 0, 0).grapheme, "e\u{0301}");
    assert_eq!(cell(&screen, 0, 0).width, 1);
    assert_eq!(cell(&screen, 1, 0).grapheme, "x");
}

#[test]
fn backspace_moves_without_erasing() {
    let screen = screen_after(W, 4, "abc\x08\x08");
    assert_eq!(screen.cursor(), (1, 0));
    assert_eq!(cell(&screen, 1, 0).grapheme, "b");
    assert_eq!(cell(&screen, 2, 0).grapheme, "c");
}

#[test]
fn erase_in_display_modes() {
    let fill = "aaaa\r\nbbbb\r\ncccc";
    let screen = screen_after(4, 3, &format!("{fill}\x1b[2;2H\x1b[0J"));
    assert_eq!(screen.row(0).expect("row").text(), "aaaa");
    assert_eq!(screen.row(1).expect("row").text(), "b   ");
    assert_eq!(screen.row(2).expect("row").text(), "    ");

    let screen = screen_after(4, 3, &format!("{fill}\x1b[2;2H\x1b[1J"));
    assert_eq!(screen.row(0).expect("row").text(), "    ");
    assert_eq!(screen.row(1).expect("row").text(), "  bb");
    assert_eq!(screen.row(2).expect("row").text(), "cccc");

    let screen = screen_after(4, 3, &format!("{fill}\x1b[2J"));
    for r in 0..3 {
        assert_eq!(screen.row(r).expect("row").text(), "    ");
    }
}

#[test]
fn erase_in_line_modes() {
    let screen = screen_after(8, 2, "abcdefgh\x1b[1;4H\x1b[K");
    assert_eq!(screen.row(0).expect("row").text(), "abc     ");

    let screen = screen_after(8, 2, "abcdefgh\x1b[1;4H\x1b[1K");
    assert_eq!(screen.row(0).expect("row").text(), "    efgh");

    let screen = screen_after(8, 2, "abcdefgh\x1b[2K");
    assert_eq!(screen.row(0).expect("row").text(), "        ");
}

#[test]
fn relative_cursor_moves_clamp_to_grid() {
    let screen = screen_after(10, 4, "\x1b[99A\x1b[99D");
    assert_eq!(screen.cursor(), (0, 0));
    let screen = screen_after(10, 4, "\x1b[99B\x1b[99C");
    assert_eq!(screen.cursor(), (9, 3));
    let screen = screen_after(10, 4, "\x1b[2;2H\x1b[A\x1b[C");
    assert_eq!(screen.cursor(), (2, 0));
}

#[test]
fn scrolling_retains_rows_in_fifo_scrollback() {
    let mut input = String::new();
    for i in 0..10 {
        input.push_str(&format!("line{i}\r\n"));
    }
    let screen = screen_after(10, 4, &input);
    // 10 lines plus the trailing blank row into 4 visible rows.
    assert_eq!(screen.scrollback_len(), 7);
    let lines = screen.render_lines(screen.max_view_offset());
    assert!(lines[0].contains("line0"));
    let live = screen.render_lines(0);
    assert!(live[2].contains("line9"));
}

#[test]
fn scrolled_in_rows_take_the_current_pen() {
    let screen = screen_after(10, 2, "\x1b[41ma\r\nb\r\nc");
    let blank = screen.cell(5, 1).expect("cell");
    assert_eq!(blank.pen.bg, Color::Indexed(1));
}

#[test]
fn erased_cells_take_the_default_pen() {
    let screen = screen_after(10, 2, "\x1b[41mabc\x1b[1;1H\x1b[K");
    assert_eq!(screen.cell(0, 0).expect("cell").pen, Pen::default());
}

#[test]
fn cursor_stays_in_bounds_for_hostile_input() {
    let soup = "\x1b[99;99Hxyz\x1b[A\x1b[A\x1b[A🐛🐛🐛\x1b[Kq\x1b]0;noise\x07\
                \r\n\r\n\r\n\r\n\r\n\x1b[5D\x1b[31mred\x1b[0mtail\x1b[9";
    let screen = screen_after(8, 5, soup);
    let (col, row) = screen.cursor();
    assert!(col < 8, "cursor col {col}");
    assert!(row < 5, "cursor row {row}");
    assert_row_widths(&screen);
}

#[test]
fn resize_clamps_cursor_and_repairs_split_glyphs() {
    let mut screen = ScreenBuffer::new(10, 4);
    let mut parser = VtParser::new();
    parser.feed("abcdef🐛".as_bytes(), &mut screen);
    screen.resize(7, 2);
    let (col, row) = screen.cursor();
    assert!(col < 7 && row < 2);
    assert_row_widths(&screen);
}
