use std::hint::black_box;

use chrono::Utc;
use criterion::{Criterion, criterion_group, criterion_main};
use lesson_marks_engine::anchoring;
use lesson_marks_engine::restore::restore_all;
use lesson_marks_engine::{Anchor, Document, HighlightColor, Note, NoteDraft, NoteId, NoteScope};

fn generate_lesson(paragraphs: usize) -> String {
    (0..paragraphs)
        .map(|i| format!("Paragraph {i} talks about *topic {i}* and **detail {i}** at length.\n\n"))
        .collect()
}

fn generate_notes(document: &Document, count: usize) -> Vec<Note> {
    let scope = NoteScope::new("bench", "lesson");
    (0..count)
        .map(|i| {
            let needle = format!("detail {i}");
            let tree = document.live();
            let span = anchoring::locate(tree, tree.root(), &needle).unwrap();
            let shape = document.encode_selection(&span).unwrap();
            let anchor = Anchor::new(shape, HighlightColor::Yellow, needle);
            let draft = NoteDraft::highlight(scope.clone(), i as u32, anchor, "");
            Note::from_draft(NoteId::new(format!("note-{i}")), draft, Utc::now())
        })
        .collect()
}

fn bench_restore(c: &mut Criterion) {
    let mut group = c.benchmark_group("restore");
    group.sample_size(10);

    let document = Document::from_markdown(&generate_lesson(200));
    let notes = generate_notes(&document, 50);

    group.bench_function("restore_all_fresh", |b| {
        b.iter(|| {
            let mut d = document.clone();
            black_box(restore_all(&mut d, black_box(&notes), true));
        });
    });

    let mut restored = document.clone();
    restore_all(&mut restored, &notes, true);
    group.bench_function("restore_all_already_present", |b| {
        b.iter(|| {
            black_box(restore_all(&mut restored, black_box(&notes), true));
        });
    });

    group.finish();
}

criterion_group!(benches, bench_restore);
criterion_main!(benches);
