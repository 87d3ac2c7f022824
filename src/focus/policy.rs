//! Container-order focus traversal.
//!
//! The order is a depth-first walk of the hierarchy below a focus cycle
//! root: a container comes before its children, children before the next
//! sibling. Nested focus cycle roots and policy providers show up in the
//! walk as single stops; what happens when traversal reaches one of them
//! depends on its kind:
//!
//! - a policy provider hands traversal to its own policy until that policy
//!   runs off the end of the provider's subtree, then traversal continues in
//!   the enclosing cycle;
//! - a nested focus cycle root is entered at its default component when
//!   implicit down-cycle traversal is enabled, otherwise it is an ordinary
//!   stop.

use crate::error::FocusError;
use crate::event::ComponentId;
use crate::tree::ComponentTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContainerOrderPolicy {
    implicit_down_cycle_traversal: bool,
}

impl Default for ContainerOrderPolicy {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ContainerOrderPolicy {
    pub fn new(implicit_down_cycle_traversal: bool) -> Self {
        Self {
            implicit_down_cycle_traversal,
        }
    }

    pub fn implicit_down_cycle_traversal(&self) -> bool {
        self.implicit_down_cycle_traversal
    }

    pub fn set_implicit_down_cycle_traversal(&mut self, enabled: bool) {
        self.implicit_down_cycle_traversal = enabled;
    }

    /// The one inclusion test every traversal query goes through.
    pub fn accept(&self, tree: &ComponentTree, id: ComponentId) -> bool {
        tree.is_visible(id) && tree.is_displayable(id) && tree.is_enabled(id) && tree.is_focusable(id)
    }

    /// Component that follows `component` in the cycle of `root`. Wraps to
    /// the first component when `root` is a focus cycle root.
    pub fn component_after(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
        component: ComponentId,
    ) -> Result<Option<ComponentId>, FocusError> {
        self.validate(tree, root, component)?;
        let wrap = tree.is_focus_cycle_root(root);
        Ok(self.step(tree, root, component, Direction::Forward, wrap))
    }

    /// Component that precedes `component` in the cycle of `root`. Wraps to
    /// the last component when `root` is a focus cycle root.
    pub fn component_before(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
        component: ComponentId,
    ) -> Result<Option<ComponentId>, FocusError> {
        self.validate(tree, root, component)?;
        let wrap = tree.is_focus_cycle_root(root);
        Ok(self.step(tree, root, component, Direction::Backward, wrap))
    }

    pub fn first_component(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
    ) -> Result<Option<ComponentId>, FocusError> {
        self.require_container(tree, root)?;
        Ok(self.first(tree, root))
    }

    pub fn last_component(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
    ) -> Result<Option<ComponentId>, FocusError> {
        self.require_container(tree, root)?;
        Ok(self.last(tree, root))
    }

    pub fn default_component(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
    ) -> Result<Option<ComponentId>, FocusError> {
        self.first_component(tree, root)
    }

    /// Component to focus when `window` is shown for the first time.
    pub fn initial_component(
        &self,
        tree: &ComponentTree,
        window: ComponentId,
    ) -> Result<Option<ComponentId>, FocusError> {
        if !tree.is_window(window) {
            tree.kind(window)?;
            return Err(FocusError::NotAWindow(window));
        }
        self.default_component(tree, window)
    }

    fn require_container(&self, tree: &ComponentTree, id: ComponentId) -> Result<(), FocusError> {
        if tree.kind(id)?.is_container() {
            Ok(())
        } else {
            Err(FocusError::NotAContainer(id))
        }
    }

    fn validate(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
        component: ComponentId,
    ) -> Result<(), FocusError> {
        self.require_container(tree, root)?;
        tree.kind(component)?;
        let in_cycle = tree.is_focus_cycle_root_of(root, component)
            || (tree.is_focus_traversal_policy_provider(root)
                && tree.is_ancestor_of(root, component));
        if in_cycle {
            Ok(())
        } else {
            Err(FocusError::NotInCycle { root, component })
        }
    }

    fn policy_for(&self, tree: &ComponentTree, container: ComponentId) -> ContainerOrderPolicy {
        tree.effective_policy(container).unwrap_or(*self)
    }

    /// Container order of the stops in the cycle of `root`, `root` first.
    /// Hidden containers contribute nothing.
    fn cycle(&self, tree: &ComponentTree, root: ComponentId) -> Vec<ComponentId> {
        let mut out = Vec::new();
        self.enumerate(tree, root, &mut out);
        out
    }

    fn enumerate(&self, tree: &ComponentTree, container: ComponentId, out: &mut Vec<ComponentId>) {
        if !(tree.is_visible(container) && tree.is_displayable(container)) {
            return;
        }
        out.push(container);
        for &child in tree.children(container) {
            let opaque =
                tree.is_focus_cycle_root(child) || tree.is_focus_traversal_policy_provider(child);
            if tree.is_container(child) && !opaque {
                self.enumerate(tree, child, out);
            } else {
                out.push(child);
            }
        }
    }

    // Outermost policy provider strictly between `root` and `component`.
    fn topmost_provider(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
        component: ComponentId,
    ) -> Option<ComponentId> {
        let mut found = None;
        let mut current = tree.parent(component);
        while let Some(c) = current {
            if c == root {
                return found;
            }
            if tree.is_focus_traversal_policy_provider(c) {
                found = Some(c);
            }
            current = tree.parent(c);
        }
        None
    }

    // Where traversal lands when it enters `id`, if `id` is a container that
    // is entered rather than stopped at. Leaving `id` itself forward
    // (`from_inside`) skips `id` so a focusable container is not re-entered
    // at its own stop.
    fn down_cycle(
        &self,
        tree: &ComponentTree,
        id: ComponentId,
        dir: Direction,
        from_inside: bool,
    ) -> Option<ComponentId> {
        if !tree.is_container(id) {
            return None;
        }
        let include_self = !from_inside;
        if tree.is_focus_cycle_root(id) {
            if !self.implicit_down_cycle_traversal {
                return None;
            }
            return self.policy_for(tree, id).first_in(tree, id, include_self);
        }
        if tree.is_focus_traversal_policy_provider(id) {
            let policy = self.policy_for(tree, id);
            return match dir {
                Direction::Forward => policy.first_in(tree, id, include_self),
                Direction::Backward => policy.last(tree, id),
            };
        }
        None
    }

    fn step(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
        component: ComponentId,
        dir: Direction,
        wrap: bool,
    ) -> Option<ComponentId> {
        if dir == Direction::Forward
            && let Some(inner) = self.down_cycle(tree, component, dir, true)
        {
            return Some(inner);
        }

        let mut from = component;
        if let Some(provider) = self.topmost_provider(tree, root, component) {
            // The provider's own walk never wraps; running off its end means
            // traversal leaves the provider.
            let policy = self.policy_for(tree, provider);
            if let Some(found) = policy.step(tree, provider, component, dir, false) {
                return Some(found);
            }
            from = provider;
            if dir == Direction::Backward && self.accept(tree, provider) {
                return Some(provider);
            }
        }

        let cycle = self.cycle(tree, root);
        let Some(index) = cycle.iter().position(|c| *c == from) else {
            return match dir {
                Direction::Forward => self.first(tree, root),
                Direction::Backward => self.last(tree, root),
            };
        };

        let found = match dir {
            Direction::Forward => cycle[index + 1..]
                .iter()
                .find_map(|&c| {
                    self.down_cycle(tree, c, dir, false)
                        .or_else(|| self.accepted(tree, c))
                }),
            Direction::Backward => cycle[..index].iter().rev().find_map(|&c| {
                let inner = if c != root {
                    self.down_cycle(tree, c, dir, false)
                } else {
                    None
                };
                inner.or_else(|| self.accepted(tree, c))
            }),
        };
        if found.is_some() || !wrap {
            return found;
        }
        match dir {
            Direction::Forward => self.first(tree, root),
            Direction::Backward => self.last(tree, root),
        }
    }

    fn accepted(&self, tree: &ComponentTree, id: ComponentId) -> Option<ComponentId> {
        self.accept(tree, id).then_some(id)
    }

    fn first(&self, tree: &ComponentTree, root: ComponentId) -> Option<ComponentId> {
        self.first_in(tree, root, true)
    }

    fn first_in(
        &self,
        tree: &ComponentTree,
        root: ComponentId,
        include_root: bool,
    ) -> Option<ComponentId> {
        self.cycle(tree, root)
            .into_iter()
            .filter(|c| include_root || *c != root)
            .find_map(|c| {
                self.accepted(tree, c).or_else(|| {
                    if c != root {
                        self.down_cycle(tree, c, Direction::Forward, false)
                    } else {
                        None
                    }
                })
            })
    }

    fn last(&self, tree: &ComponentTree, root: ComponentId) -> Option<ComponentId> {
        self.cycle(tree, root).into_iter().rev().find_map(|c| {
            self.accepted(tree, c).or_else(|| {
                if c != root {
                    self.down_cycle(tree, c, Direction::Backward, false)
                } else {
                    None
                }
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(names: &[&str]) -> (ComponentTree, ComponentId, Vec<ComponentId>) {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let ids = names
            .iter()
            .map(|n| tree.add_component(root, *n).unwrap())
            .collect();
        (tree, root, ids)
    }

    #[test]
    fn siblings_in_order_and_wrap() {
        let (tree, root, ids) = flat(&["a", "b", "c"]);
        let policy = ContainerOrderPolicy::default();
        assert_eq!(policy.first_component(&tree, root), Ok(Some(ids[0])));
        assert_eq!(policy.last_component(&tree, root), Ok(Some(ids[2])));
        assert_eq!(policy.component_after(&tree, root, ids[0]), Ok(Some(ids[1])));
        assert_eq!(policy.component_after(&tree, root, ids[2]), Ok(Some(ids[0])));
        assert_eq!(policy.component_before(&tree, root, ids[0]), Ok(Some(ids[2])));
        assert_eq!(policy.default_component(&tree, root), Ok(Some(ids[0])));
    }

    #[test]
    fn rejected_components_are_skipped() {
        let (mut tree, root, ids) = flat(&["a", "b", "c", "d"]);
        tree.set_enabled(ids[1], false).unwrap();
        tree.set_visible(ids[2], false).unwrap();
        let policy = ContainerOrderPolicy::default();
        assert_eq!(policy.component_after(&tree, root, ids[0]), Ok(Some(ids[3])));
        assert_eq!(policy.component_before(&tree, root, ids[3]), Ok(Some(ids[0])));
    }

    #[test]
    fn no_acceptable_component_yields_none() {
        let (mut tree, root, ids) = flat(&["a", "b"]);
        tree.set_focusable(ids[1], false).unwrap();
        let policy = ContainerOrderPolicy::default();
        // the only acceptable stop is the start itself
        assert_eq!(policy.component_after(&tree, root, ids[0]), Ok(Some(ids[0])));
        tree.set_focusable(ids[0], false).unwrap();
        assert_eq!(policy.component_after(&tree, root, ids[0]), Ok(None));
        assert_eq!(policy.first_component(&tree, root), Ok(None));
    }

    #[test]
    fn plain_containers_are_walked_inline() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let a = tree.add_component(root, "a").unwrap();
        let panel = tree.add_container(root, "panel").unwrap();
        let b = tree.add_component(panel, "b").unwrap();
        let c = tree.add_component(panel, "c").unwrap();
        let d = tree.add_component(root, "d").unwrap();
        let policy = ContainerOrderPolicy::default();
        assert_eq!(policy.component_after(&tree, root, a), Ok(Some(b)));
        assert_eq!(policy.component_after(&tree, root, c), Ok(Some(d)));
        assert_eq!(policy.component_before(&tree, root, b), Ok(Some(a)));
        assert_eq!(policy.component_before(&tree, root, d), Ok(Some(c)));

        tree.set_visible(panel, false).unwrap();
        assert_eq!(policy.component_after(&tree, root, a), Ok(Some(d)));
    }

    #[test]
    fn empty_focusable_container_is_its_own_first_and_last() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let panel = tree.add_container(root, "panel").unwrap();
        tree.set_focusable(panel, true).unwrap();
        let policy = ContainerOrderPolicy::default();
        assert_eq!(policy.first_component(&tree, panel), Ok(Some(panel)));
        assert_eq!(policy.last_component(&tree, panel), Ok(Some(panel)));
    }

    #[test]
    fn provider_is_left_at_its_end_instead_of_looping() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let a = tree.add_component(root, "a").unwrap();
        let provider = tree.add_container(root, "provider").unwrap();
        tree.set_focus_traversal_policy_provider(provider, true)
            .unwrap();
        let x = tree.add_component(provider, "x").unwrap();
        let y = tree.add_component(provider, "y").unwrap();
        let b = tree.add_component(root, "b").unwrap();
        let policy = ContainerOrderPolicy::default();

        assert_eq!(policy.component_after(&tree, root, a), Ok(Some(x)));
        assert_eq!(policy.component_after(&tree, root, x), Ok(Some(y)));
        assert_eq!(policy.component_after(&tree, root, y), Ok(Some(b)));
        assert_eq!(policy.component_before(&tree, root, b), Ok(Some(y)));
        assert_eq!(policy.component_before(&tree, root, x), Ok(Some(a)));
        // the provider itself does not wrap
        assert_eq!(policy.component_after(&tree, provider, y), Ok(None));
    }

    #[test]
    fn nested_cycle_root_entry_depends_on_implicit_flag() {
        // (implicit, expected stop after `a`)
        let table = [(true, "inner_x"), (false, "b")];
        for (implicit, expected) in table {
            let mut tree = ComponentTree::new();
            let root = tree.add_frame("root");
            let a = tree.add_component(root, "a").unwrap();
            let inner = tree.add_container(root, "inner").unwrap();
            tree.set_focus_cycle_root(inner, true).unwrap();
            tree.add_component(inner, "inner_x").unwrap();
            tree.add_component(root, "b").unwrap();
            let policy = ContainerOrderPolicy::new(implicit);
            let after = policy.component_after(&tree, root, a).unwrap().unwrap();
            assert_eq!(tree.name(after), expected, "implicit={implicit}");
        }
    }

    #[test]
    fn nested_cycle_root_is_a_stop_when_focusable() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let a = tree.add_component(root, "a").unwrap();
        let inner = tree.add_container(root, "inner").unwrap();
        tree.set_focus_cycle_root(inner, true).unwrap();
        tree.set_focusable(inner, true).unwrap();
        tree.add_component(inner, "inner_x").unwrap();
        let policy = ContainerOrderPolicy::new(false);
        assert_eq!(policy.component_after(&tree, root, a), Ok(Some(inner)));
    }

    // root [ a, inner (focusable) [ x ], b ], `inner` either a cycle root
    // or a policy provider. Each step is taken in the cycle owning the
    // current component.
    fn walk_focusable_container(cycle_root: bool, implicit: bool, steps: usize) -> Vec<String> {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let a = tree.add_component(root, "a").unwrap();
        let inner = tree.add_container(root, "inner").unwrap();
        tree.set_focusable(inner, true).unwrap();
        if cycle_root {
            tree.set_focus_cycle_root(inner, true).unwrap();
        } else {
            tree.set_focus_traversal_policy_provider(inner, true)
                .unwrap();
        }
        tree.add_component(inner, "x").unwrap();
        tree.add_component(root, "b").unwrap();

        let policy = ContainerOrderPolicy::new(implicit);
        let mut current = a;
        let mut names = vec![tree.name(a).to_string()];
        for _ in 0..steps {
            let cycle = tree.focus_cycle_root_ancestor(current).unwrap();
            current = policy
                .component_after(&tree, cycle, current)
                .unwrap()
                .unwrap();
            names.push(tree.name(current).to_string());
        }
        names
    }

    #[test]
    fn focusable_nested_containers_do_not_trap_traversal() {
        // (cycle root, implicit down-cycle, expected walk from `a`)
        let table = [
            (true, true, ["a", "inner", "x", "inner", "x", "inner"]),
            (true, false, ["a", "inner", "b", "a", "inner", "b"]),
            (false, true, ["a", "inner", "x", "b", "a", "inner"]),
            (false, false, ["a", "inner", "x", "b", "a", "inner"]),
        ];
        for (cycle_root, implicit, expected) in table {
            let walk = walk_focusable_container(cycle_root, implicit, 5);
            assert_eq!(walk, expected, "cycle_root={cycle_root} implicit={implicit}");
        }
    }

    #[test]
    fn focusable_provider_is_walked_backward_through_its_contents() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let a = tree.add_component(root, "a").unwrap();
        let provider = tree.add_container(root, "provider").unwrap();
        tree.set_focusable(provider, true).unwrap();
        tree.set_focus_traversal_policy_provider(provider, true)
            .unwrap();
        let x = tree.add_component(provider, "x").unwrap();
        let b = tree.add_component(root, "b").unwrap();
        let policy = ContainerOrderPolicy::default();
        assert_eq!(policy.component_before(&tree, root, b), Ok(Some(x)));
        assert_eq!(policy.component_before(&tree, root, x), Ok(Some(provider)));
        assert_eq!(policy.component_before(&tree, root, provider), Ok(Some(a)));
    }

    #[test]
    fn components_outside_the_cycle_are_rejected() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        let inner = tree.add_container(root, "inner").unwrap();
        tree.set_focus_cycle_root(inner, true).unwrap();
        let deep = tree.add_component(inner, "deep").unwrap();
        let leaf = tree.add_component(root, "leaf").unwrap();
        let policy = ContainerOrderPolicy::default();
        assert_eq!(
            policy.component_after(&tree, root, deep),
            Err(FocusError::NotInCycle {
                root,
                component: deep
            })
        );
        assert_eq!(
            policy.first_component(&tree, leaf),
            Err(FocusError::NotAContainer(leaf))
        );
        assert_eq!(
            policy.component_after(&tree, root, ComponentId(99)),
            Err(FocusError::UnknownComponent(ComponentId(99)))
        );
    }

    #[test]
    fn full_cycle_returns_to_the_start() {
        let mut tree = ComponentTree::new();
        let root = tree.add_frame("root");
        tree.add_component(root, "a").unwrap();
        let panel = tree.add_container(root, "panel").unwrap();
        tree.add_component(panel, "b").unwrap();
        let provider = tree.add_container(root, "provider").unwrap();
        tree.set_focus_traversal_policy_provider(provider, true)
            .unwrap();
        tree.add_component(provider, "c").unwrap();
        tree.add_component(provider, "d").unwrap();
        let skipped = tree.add_component(root, "skipped").unwrap();
        tree.set_enabled(skipped, false).unwrap();
        tree.add_component(root, "e").unwrap();

        let policy = ContainerOrderPolicy::default();
        let first = policy.first_component(&tree, root).unwrap().unwrap();
        let mut seen = vec![first];
        let mut current = first;
        for _ in 0..5 {
            current = policy.component_after(&tree, root, current).unwrap().unwrap();
            seen.push(current);
        }
        let names: Vec<&str> = seen.iter().map(|id| tree.name(*id)).collect();
        assert_eq!(names, ["a", "b", "c", "d", "e", "a"]);

        // same question, same answer
        let again = policy.component_after(&tree, root, first).unwrap();
        assert_eq!(again, policy.component_after(&tree, root, first).unwrap());
    }
}
