use lesson_marks_engine::anchoring::{self, Boundary, TextSpan};
use lesson_marks_engine::dom::{render_markdown, to_html};
use lesson_marks_engine::highlight::{self, ApplyOutcome};
use lesson_marks_engine::restore::{Resolution, resolve_anchor};
use lesson_marks_engine::{Anchor, AnchorSlot, DocTree, Document, HighlightColor, NoteId};
use pretty_assertions::assert_eq;
use rstest::rstest;

const LESSON: &str = "# Chapter 1\n\nIntro with *nested **deep** words* inside.\n\n1. First step\n2. Second **bold** step\n\n> A quote with `code` in it.\n\nTail paragraph.";

fn find(tree: &DocTree, needle: &str) -> TextSpan {
    anchoring::locate(tree, tree.root(), needle).unwrap()
}

#[rstest]
#[case::heading("Chapter")]
#[case::mid_text("with")]
#[case::into_nesting("Intro with nested")]
#[case::out_of_nesting("deep words inside")]
#[case::across_list_items("First stepSecond")]
#[case::inline_code("code")]
#[case::across_blocks("it.Tail")]
fn decode_of_encode_covers_same_text(#[case] needle: &str) {
    let tree = render_markdown(LESSON);
    let span = find(&tree, needle);

    let shape = anchoring::encode(&tree, &span).unwrap();
    let fresh = render_markdown(LESSON);
    let decoded = anchoring::decode(&fresh, &shape).unwrap();

    assert_eq!(decoded.text(&fresh).as_deref(), Some(needle));
}

#[test]
fn round_trip_with_element_boundaries() {
    let tree = render_markdown(LESSON);
    let list = tree.children(tree.root())[2];
    let span = TextSpan::new(Boundary::new(list, 1), Boundary::new(list, 2));

    let shape = anchoring::encode(&tree, &span).unwrap();

    assert_eq!(shape.start_path.to_string(), "/ol[1]");
    let decoded = anchoring::decode(&tree, &shape).unwrap();
    assert_eq!(decoded.text(&tree).as_deref(), Some("Second bold step"));
}

#[rstest]
#[case("nested deep")]
#[case("Intro with nested deep words inside.")]
#[case("stepSecond bold")]
fn applying_twice_yields_one_marker(#[case] needle: &str) {
    let mut tree = render_markdown(LESSON);
    let id = NoteId::new("n1");
    let mut span = find(&tree, needle);

    let first = highlight::apply(&mut tree, &mut span, &id, HighlightColor::Yellow, AnchorSlot::Primary)
        .unwrap();
    let html = to_html(&tree);
    let mut fresh_span = find(&tree, needle);
    let second = highlight::apply(
        &mut tree,
        &mut fresh_span,
        &id,
        HighlightColor::Yellow,
        AnchorSlot::Primary,
    )
    .unwrap();

    assert!(matches!(first, ApplyOutcome::Applied(_)));
    assert!(matches!(second, ApplyOutcome::AlreadyApplied(_)));
    assert_eq!(highlight::markers_for(&tree, &id).len(), 1);
    assert_eq!(to_html(&tree), html);
}

#[rstest]
#[case("nested deep")]
#[case("deep words inside")]
#[case("First stepSecond")]
#[case("Tail")]
fn remove_restores_text_content(#[case] needle: &str) {
    let mut tree = render_markdown(LESSON);
    let text_before = tree.text_content(tree.root());
    let id = NoteId::new("n1");
    let mut span = find(&tree, needle);

    highlight::apply(&mut tree, &mut span, &id, HighlightColor::Pink, AnchorSlot::Primary).unwrap();
    assert_eq!(highlight::markers_for(&tree, &id).len(), 1);
    highlight::remove(&mut tree, &id);

    assert_eq!(tree.text_content(tree.root()), text_before);
    assert!(highlight::markers_for(&tree, &id).is_empty());
}

#[test]
fn unique_text_is_reanchored_after_structure_changes() {
    let original = Document::from_markdown("Alpha paragraph.\n\nThe unique phrase lives here.");
    let span = find(original.live(), "unique phrase");
    let anchor = Anchor::new(
        original.encode_selection(&span).unwrap(),
        HighlightColor::Blue,
        "unique phrase",
    );

    let edited = Document::from_markdown(
        "# New heading\n\nAlpha paragraph.\n\nExtra.\n\nThe *unique phrase* lives here.",
    );
    let resolved = resolve_anchor(edited.baseline(), &anchor, true).unwrap();

    assert_eq!(resolved.via, Resolution::Fallback);
    let span = edited.live_span(resolved.range).unwrap();
    assert_eq!(span.text(edited.live()).as_deref(), Some("unique phrase"));
}
