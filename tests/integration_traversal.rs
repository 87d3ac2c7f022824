use crossterm::event::{KeyCode, KeyModifiers};

use focus_wm::focus::{KeyStroke, TraversalAction, TraversalKeys};
use focus_wm::{
    ComponentId, ComponentTree, ContainerOrderPolicy, Desktop, EventRecord, FocusConfig,
    FocusError, NativeFocusEvent, NativeId, RecordingPeer,
};

struct Form {
    tree: ComponentTree,
    frame: ComponentId,
    a: ComponentId,
    form: ComponentId,
    x: ComponentId,
    y: ComponentId,
    b: ComponentId,
}

// frame [ a, form (cycle root) [ x, y ], b ]
fn form_tree() -> Form {
    let mut tree = ComponentTree::new();
    let frame = tree.add_frame("frame");
    tree.set_native_id(frame, NativeId(1)).unwrap();
    let a = tree.add_component(frame, "a").unwrap();
    let form = tree.add_container(frame, "form").unwrap();
    tree.set_focus_cycle_root(form, true).unwrap();
    let x = tree.add_component(form, "x").unwrap();
    let y = tree.add_component(form, "y").unwrap();
    let b = tree.add_component(frame, "b").unwrap();
    Form {
        tree,
        frame,
        a,
        form,
        x,
        y,
        b,
    }
}

fn start(tree: ComponentTree, config: FocusConfig) -> Desktop {
    let desktop = Desktop::with_config(tree, RecordingPeer::new(), config);
    desktop.native_focus(NativeFocusEvent::gained(NativeId(1), None));
    desktop.pump();
    desktop
}

fn press(desktop: &Desktop, window: ComponentId, code: KeyCode) -> Option<ComponentId> {
    desktop.post_event(EventRecord::key_pressed(window, code, KeyModifiers::NONE));
    desktop.pump();
    desktop.focus_owner()
}

#[test]
fn tab_enters_nested_cycle_and_stays_there() {
    let f = form_tree();
    let desktop = start(f.tree, FocusConfig::default());
    assert_eq!(desktop.focus_owner(), Some(f.a));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.x));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.y));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.x));
}

#[test]
fn without_implicit_down_cycle_the_nested_root_is_skipped() {
    let f = form_tree();
    let config = FocusConfig::default().with_implicit_down_cycle_traversal(false);
    let desktop = start(f.tree, config);
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.b));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.a));
    assert_eq!(press(&desktop, f.frame, KeyCode::BackTab), Some(f.b));
}

#[test]
fn up_and_down_cycle_move_the_current_cycle_root() {
    let f = form_tree();
    let desktop = start(f.tree, FocusConfig::default());
    assert!(desktop.down_focus_cycle(f.form));
    desktop.pump();
    assert_eq!(desktop.current_focus_cycle_root(), Some(f.form));
    assert_eq!(desktop.focus_owner(), Some(f.x));

    // the form itself cannot take focus, but the cycle root still moves out
    assert!(!desktop.up_focus_cycle(f.y));
    assert_eq!(desktop.current_focus_cycle_root(), Some(f.frame));

    assert!(desktop.up_focus_cycle(f.b));
    desktop.pump();
    assert_eq!(desktop.focus_owner(), Some(f.a));
    assert!(!desktop.down_focus_cycle(f.a));
}

#[test]
fn configured_up_cycle_key_focuses_the_cycle_root() {
    let mut f = form_tree();
    f.tree.set_focusable(f.form, true).unwrap();
    let mut keys = TraversalKeys::default();
    keys.add(
        TraversalAction::UpCycle,
        KeyStroke::pressed(KeyCode::F(1), KeyModifiers::NONE),
    );
    let desktop = start(f.tree, FocusConfig::default().with_traversal_keys(keys));
    assert!(desktop.request_focus(f.y));
    desktop.pump();
    assert_eq!(press(&desktop, f.frame, KeyCode::F(1)), Some(f.form));
    assert_eq!(desktop.current_focus_cycle_root(), Some(f.frame));
}

#[test]
fn per_component_keys_override_the_defaults() {
    let f = form_tree();
    let a = f.a;
    let mut tree = f.tree;
    let mut keys = TraversalKeys::empty();
    keys.add(
        TraversalAction::Forward,
        KeyStroke::pressed(KeyCode::Down, KeyModifiers::NONE),
    );
    tree.set_traversal_keys(a, keys).unwrap();
    let desktop = start(tree, FocusConfig::default());
    // Tab is no longer a traversal key on `a`
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(a));
    assert_eq!(press(&desktop, f.frame, KeyCode::Down), Some(f.x));
}

#[test]
fn tab_moves_on_from_a_focusable_cycle_root() {
    let mut f = form_tree();
    f.tree.set_focusable(f.form, true).unwrap();
    let desktop = start(f.tree, FocusConfig::default());
    assert_eq!(desktop.focus_owner(), Some(f.a));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.form));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.x));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.y));
    // the form's own cycle includes the form
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.form));

    let mut f = form_tree();
    f.tree.set_focusable(f.form, true).unwrap();
    let config = FocusConfig::default().with_implicit_down_cycle_traversal(false);
    let desktop = start(f.tree, config);
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.form));
    assert_eq!(press(&desktop, f.frame, KeyCode::Tab), Some(f.b));
}

#[test]
fn tab_moves_on_from_a_focusable_policy_provider() {
    let mut tree = ComponentTree::new();
    let frame = tree.add_frame("frame");
    tree.set_native_id(frame, NativeId(1)).unwrap();
    let a = tree.add_component(frame, "a").unwrap();
    let panel = tree.add_container(frame, "panel").unwrap();
    tree.set_focusable(panel, true).unwrap();
    tree.set_focus_traversal_policy_provider(panel, true).unwrap();
    let p1 = tree.add_component(panel, "p1").unwrap();
    let b = tree.add_component(frame, "b").unwrap();

    let desktop = start(tree, FocusConfig::default());
    let forward: Vec<_> = (0..4)
        .map(|_| press(&desktop, frame, KeyCode::Tab))
        .collect();
    assert_eq!(forward, vec![Some(panel), Some(p1), Some(b), Some(a)]);
}

#[test]
fn policy_provider_is_walked_then_left() {
    let mut tree = ComponentTree::new();
    let frame = tree.add_frame("frame");
    tree.set_native_id(frame, NativeId(1)).unwrap();
    let a = tree.add_component(frame, "a").unwrap();
    let panel = tree.add_container(frame, "panel").unwrap();
    tree.set_focus_traversal_policy_provider(panel, true).unwrap();
    let p1 = tree.add_component(panel, "p1").unwrap();
    let p2 = tree.add_component(panel, "p2").unwrap();
    let b = tree.add_component(frame, "b").unwrap();

    let desktop = start(tree, FocusConfig::default());
    let forward: Vec<_> = (0..5)
        .map(|_| press(&desktop, frame, KeyCode::Tab))
        .collect();
    assert_eq!(forward, vec![Some(p1), Some(p2), Some(b), Some(a), Some(p1)]);
    assert_eq!(press(&desktop, frame, KeyCode::BackTab), Some(a));
    assert_eq!(press(&desktop, frame, KeyCode::BackTab), Some(b));
    assert_eq!(press(&desktop, frame, KeyCode::BackTab), Some(p2));
}

#[test]
fn traversal_queries_are_stable_and_total() {
    let f = form_tree();
    let policy = ContainerOrderPolicy::new(false);
    let first = policy.first_component(&f.tree, f.frame).unwrap();
    assert_eq!(first, Some(f.a));
    let mut current = f.a;
    for _ in 0..2 {
        let next = policy.component_after(&f.tree, f.frame, current).unwrap();
        assert_eq!(next, policy.component_after(&f.tree, f.frame, current).unwrap());
        current = next.unwrap();
    }
    assert_eq!(current, f.a);
    assert_eq!(
        policy.component_after(&f.tree, f.frame, f.x),
        Err(FocusError::NotInCycle {
            root: f.frame,
            component: f.x
        })
    );
    assert_eq!(
        policy.component_after(&f.tree, f.form, f.y).unwrap(),
        Some(f.x)
    );
    assert_eq!(
        policy.first_component(&f.tree, f.a),
        Err(FocusError::NotAContainer(f.a))
    );
}
