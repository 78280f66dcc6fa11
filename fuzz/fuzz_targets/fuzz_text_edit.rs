#![no_main]
use arbitrary::Arbitrary;
use crudearch::text;
use libfuzzer_sys::fuzz_target;

#[derive(Arbitrary, Debug)]
enum Edit {
    InsertAtIndex { text: String, index: usize },
    InsertAtPosition { text: String, row: usize, col: usize },
    Truncate { start: usize, end: usize },
    RemoveRow { row: usize, col_start: usize, col_end: usize },
    RemoveColumn { col_start: usize, col_end: usize },
    Replace { old: String, new: String },
}

#[derive(Arbitrary, Debug)]
struct Input {
    text: String,
    edits: Vec<Edit>,
}

fuzz_target!(|input: Input| {
    let mut current = input.text;
    for edit in input.edits.into_iter().take(32) {
        let result = match edit {
            Edit::InsertAtIndex { text: t, index } => text::insert_at_index(&current, &t, index),
            Edit::InsertAtPosition { text: t, row, col } => {
                text::insert_at_position(&current, &t, row, col)
            }
            Edit::Truncate { start, end } => text::truncate_row(&current, start, end),
            Edit::RemoveRow { row, col_start, col_end } => {
                text::remove_row_at_index(&current, row, col_start, col_end)
            }
            Edit::RemoveColumn { col_start, col_end } => {
                text::remove_column(&current, col_start, col_end)
            }
            Edit::Replace { old, new } => Ok(text::replace(&current, &old, &new)),
        };
        if let Ok(next) = result {
            current = next;
        }
        if current.len() > 1 << 16 {
            break;
        }
    }
});
