//! BinaryContent public API property tests
//!
//! Random edit sequences are applied to both the content and a plain `Vec<u8>`
//! model. Reads must agree and ranges must stay tiled. Undo steps are mixed into
//! the sequence: a redo must bring back exactly the bytes seen before the matching
//! undo, and undoing everything must return to the starting bytes.

use binedit::buffer::total_length;
use binedit::{BinaryContent, ContentOptions};
use proptest::test_runner::Config as ProptestConfig;
use proptest::{prelude::*, prop_oneof};

#[derive(Debug, Clone)]
enum Operation {
    InsertByte { pos: u64, byte: u8 },
    InsertBytes { pos: u64, bytes: Vec<u8> },
    Delete { pos: u64, len: u64 },
    OverwriteBytes { pos: u64, bytes: Vec<u8> },
    OverwriteBits { pos: u64, value: u8, offset: u8, len: u8 },
    Commit,
    EndAction,
    Undo,
    Redo,
    /// undo の直後に redo して内容が変わらないことを確かめる
    UndoRedo,
}

fn operation_strategy() -> impl Strategy<Value = Operation> {
    let insert_byte =
        (0u64..80, any::<u8>()).prop_map(|(pos, byte)| Operation::InsertByte { pos, byte });
    let insert_bytes = (0u64..80, proptest::collection::vec(any::<u8>(), 0..6))
        .prop_map(|(pos, bytes)| Operation::InsertBytes { pos, bytes });
    let delete = (0u64..80, 0u64..8).prop_map(|(pos, len)| Operation::Delete { pos, len });
    let overwrite_bytes = (0u64..80, proptest::collection::vec(any::<u8>(), 0..6))
        .prop_map(|(pos, bytes)| Operation::OverwriteBytes { pos, bytes });
    let overwrite_bits = (0u64..80, any::<u8>(), 0u8..9, 0u8..9).prop_map(
        |(pos, value, offset, len)| Operation::OverwriteBits {
            pos,
            value,
            offset,
            len,
        },
    );

    prop_oneof![
        3 => insert_byte,
        2 => insert_bytes,
        3 => delete,
        2 => overwrite_bytes,
        3 => overwrite_bits,
        1 => Just(Operation::Commit),
        1 => Just(Operation::EndAction),
        1 => Just(Operation::Undo),
        1 => Just(Operation::Redo),
        1 => Just(Operation::UndoRedo),
    ]
}

fn edit_strategy() -> impl Strategy<Value = Operation> {
    operation_strategy().prop_filter("history operations need history", |op| {
        !matches!(
            op,
            Operation::EndAction | Operation::Undo | Operation::Redo | Operation::UndoRedo
        )
    })
}

fn apply_to_model(model: &mut Vec<u8>, op: &Operation) {
    let len = model.len() as u64;
    match op {
        Operation::InsertByte { pos, byte } => {
            if *pos <= len {
                model.insert(*pos as usize, *byte);
            }
        }
        Operation::InsertBytes { pos, bytes } => {
            if *pos <= len {
                let at = *pos as usize;
                model.splice(at..at, bytes.iter().copied());
            }
        }
        Operation::Delete { pos, len: count } => {
            if *pos < len && *count > 0 {
                let end = (*pos + *count).min(len) as usize;
                model.drain(*pos as usize..end);
            }
        }
        Operation::OverwriteBytes { pos, bytes } => {
            if *pos < len && !bytes.is_empty() {
                let at = *pos as usize;
                let end = (at + bytes.len()).min(model.len());
                model.splice(at..end, bytes.iter().copied());
            }
        }
        Operation::OverwriteBits {
            pos,
            value,
            offset,
            len: bits,
        } => {
            if *offset > 7 || *pos >= len {
                return;
            }
            let bits = (*bits).min(8 - *offset);
            if bits == 0 {
                return;
            }
            let shift = u32::from(8 - *offset - bits);
            let mask = ((0xFFu32 >> *offset) & (0xFFu32 << shift)) as u8;
            let byte = &mut model[*pos as usize];
            *byte = (*byte & !mask) | (((u32::from(*value) << shift) as u8) & mask);
        }
        Operation::Commit
        | Operation::EndAction
        | Operation::Undo
        | Operation::Redo
        | Operation::UndoRedo => {}
    }
}

fn apply_to_content(content: &mut BinaryContent, op: &Operation) {
    match op {
        Operation::InsertByte { pos, byte } => content.insert(*byte, *pos).unwrap(),
        Operation::InsertBytes { pos, bytes } => content.insert(bytes.clone(), *pos).unwrap(),
        Operation::Delete { pos, len } => content.delete(*pos, *len),
        Operation::OverwriteBytes { pos, bytes } => {
            content.overwrite(bytes.clone(), *pos).unwrap()
        }
        Operation::OverwriteBits {
            pos,
            value,
            offset,
            len,
        } => content.overwrite_bits(*value, *offset, *len, *pos).unwrap(),
        Operation::Commit => content.commit_changes(),
        Operation::EndAction => content.end_action(),
        Operation::Undo => {
            content.undo();
        }
        Operation::Redo => {
            content.redo();
        }
        Operation::UndoRedo => {
            if content.undo().is_some() {
                content.redo();
            }
        }
    }
}

fn read_all(content: &BinaryContent) -> Vec<u8> {
    let mut buffer = vec![0u8; content.len() as usize];
    let filled = content.get(&mut buffer, 0).unwrap();
    buffer.truncate(filled);
    buffer
}

fn is_tiled(content: &BinaryContent) -> bool {
    let mut expected = 0;
    for range in content.ranges() {
        if range.position != expected || range.length == 0 {
            return false;
        }
        expected = range.exclusive_end();
    }
    total_length(content.ranges()) == expected
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 128, .. ProptestConfig::default() })]

    #[test]
    fn content_operations_match_vec_model(
        initial in proptest::collection::vec(any::<u8>(), 0..64),
        ops in proptest::collection::vec(operation_strategy(), 0..40)
    ) {
        let mut content = BinaryContent::from_bytes(initial.clone());
        let mut model = initial.clone();
        // undo 前の内容。redo で取り出す
        let mut undone: Vec<Vec<u8>> = Vec::new();

        for op in &ops {
            match op {
                Operation::Undo => {
                    let before = read_all(&content);
                    if content.undo().is_some() {
                        undone.push(before);
                        model = read_all(&content);
                    }
                }
                Operation::Redo => {
                    if content.redo().is_some() {
                        model = undone.pop().expect("redo without a matching undo");
                    }
                }
                _ => {
                    apply_to_content(&mut content, op);
                    apply_to_model(&mut model, op);
                }
            }

            prop_assert_eq!(content.len(), model.len() as u64);
            prop_assert_eq!(read_all(&content), model.clone());
            prop_assert!(is_tiled(&content));
        }

        // 取り消したままのアクションをやり直す
        while content.redo().is_some() {
            model = undone.pop().expect("redo without a matching undo");
            prop_assert_eq!(read_all(&content), model.clone());
            prop_assert!(is_tiled(&content));
        }

        // 1バイトずつの読み出しも一致する
        for (position, expected) in model.iter().enumerate() {
            prop_assert_eq!(content.byte_at(position as u64).unwrap(), Some(*expected));
        }
        prop_assert_eq!(content.byte_at(model.len() as u64).unwrap(), None);

        let finished = model.clone();
        while content.undo().is_some() {
            prop_assert!(is_tiled(&content));
        }
        prop_assert_eq!(read_all(&content), initial);

        while content.redo().is_some() {
            prop_assert!(is_tiled(&content));
        }
        prop_assert_eq!(read_all(&content), finished);
    }

    #[test]
    fn content_without_history_matches_vec_model(
        initial in proptest::collection::vec(any::<u8>(), 0..64),
        ops in proptest::collection::vec(edit_strategy(), 0..40)
    ) {
        let options = ContentOptions::default().with_history(false);
        let mut content = BinaryContent::from_bytes_with_options(initial.clone(), options);
        let mut model = initial;

        for op in &ops {
            apply_to_content(&mut content, op);
            apply_to_model(&mut model, op);
            prop_assert_eq!(read_all(&content), model.clone());
            // 置き換えで外れたソースは残らない（空の初期ソース分だけ余裕を見る）
            prop_assert!(content.source_count() <= content.ranges().len() + 1);
        }
        content.commit_changes();
        prop_assert!(is_tiled(&content));
        prop_assert_eq!(read_all(&content), model);
        prop_assert!(!content.can_undo());
    }
}
