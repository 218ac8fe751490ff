//! Fitting a slice into a document range.
//!
//! [`replace_step`] turns an arbitrary `(from, to, slice)` into a step that
//! is valid for the schema: it places the slice's content on the open
//! "frontier" of the document at `from`, wrapping, opening or dropping
//! slice nodes when they do not fit, then closes the frontier against the
//! content after `to`.

use super::replace_step::{ReplaceAroundStep, ReplaceStep};
use super::step::Step;
use super::structure::insert_point;
use super::{Transform, TransformError};
use crate::model::{
    Attrs, ContentMatch, Fragment, ModelError, Node, NodeType, ResolvedPos, Slice,
};
use tracing::trace;

/// A step replacing `from..to` with `slice`, or `None` when there is nothing
/// to do or no valid fit exists.
pub fn replace_step(
    doc: &Node,
    from: usize,
    to: usize,
    slice: &Slice,
) -> Result<Option<Step>, ModelError> {
    if from == to && slice.size() == 0 {
        return Ok(None);
    }
    let rfrom = doc.resolve(from)?;
    let rto = doc.resolve(to)?;
    if fits_trivially(&rfrom, &rto, slice) {
        return Ok(Some(ReplaceStep::new(from, to, slice.clone(), false).into()));
    }
    Ok(Fitter::new(rfrom, rto, slice.clone())?.fit())
}

fn fits_trivially(rfrom: &ResolvedPos, rto: &ResolvedPos, slice: &Slice) -> bool {
    slice.open_start() == 0
        && slice.open_end() == 0
        && rfrom.start(rfrom.depth()) == rto.start(rto.depth())
        && rfrom.parent().can_replace(
            rfrom.index(rfrom.depth()),
            rto.index(rto.depth()),
            slice.content(),
        )
}

/// An open node on the insertion side and the content it still accepts.
#[derive(Debug, Clone)]
struct Frontier {
    node_type: NodeType,
    content_match: ContentMatch,
}

/// Where the next piece of unplaced content goes.
#[derive(Debug)]
struct Fittable {
    slice_depth: usize,
    frontier_depth: usize,
    parent: Option<Node>,
    inject: Option<Fragment>,
    wrap: Option<Vec<NodeType>>,
}

#[derive(Debug)]
struct CloseLevel {
    depth: usize,
    fit: Fragment,
    move_to: ResolvedPos,
}

struct Fitter {
    from: ResolvedPos,
    to: ResolvedPos,
    unplaced: Slice,
    frontier: Vec<Frontier>,
    /// Content placed so far, open along its right edge down to the
    /// frontier.
    placed: Fragment,
}

impl Fitter {
    fn new(from: ResolvedPos, to: ResolvedPos, unplaced: Slice) -> Result<Self, ModelError> {
        let mut frontier = Vec::with_capacity(from.depth() + 1);
        for depth in 0..=from.depth() {
            let node = from.node(depth);
            frontier.push(Frontier {
                node_type: node.node_type().clone(),
                content_match: node.content_match_at(from.index_after(depth))?,
            });
        }
        let mut placed = Fragment::empty();
        for depth in (1..=from.depth()).rev() {
            placed = Fragment::from(from.node(depth).copy(placed));
        }
        Ok(Self {
            from,
            to,
            unplaced,
            frontier,
            placed,
        })
    }

    fn depth(&self) -> usize {
        self.frontier.len() - 1
    }

    fn fit(mut self) -> Option<Step> {
        while self.unplaced.size() > 0 {
            if let Some(fit) = self.find_fittable() {
                trace!(
                    slice_depth = fit.slice_depth,
                    frontier_depth = fit.frontier_depth,
                    "placing unplaced content"
                );
                self.place_nodes(fit)?;
            } else if self.open_more() {
                trace!(open_start = self.unplaced.open_start(), "opened unplaced slice");
            } else {
                trace!("dropping unplaceable node");
                self.drop_node();
            }
        }

        // Inline content directly after both the frontier and `to` has to
        // be pulled into the frontier's textblock with a ReplaceAround step,
        // so the fit is closed at the end of the textblock after `to`.
        let move_inline = self.must_move_inline();
        let placed_size = self
            .placed
            .size()
            .saturating_sub(self.depth() + self.from.depth());
        let from = self.from.clone();
        let close_at = match move_inline {
            Some(pos) => from.doc().resolve(pos).ok()?,
            None => self.to.clone(),
        };
        let to = self.close(close_at)?;

        let mut content = self.placed.clone();
        let mut open_start = from.depth();
        let mut open_end = to.depth();
        while open_start > 0 && open_end > 0 && content.child_count() == 1 {
            content = content.first_child()?.content().clone();
            open_start -= 1;
            open_end -= 1;
        }
        let slice = Slice::new(content, open_start, open_end);
        if let Some(move_inline) = move_inline {
            return Some(
                ReplaceAroundStep::new(
                    from.pos(),
                    move_inline,
                    self.to.pos(),
                    self.to.end(self.to.depth()),
                    slice,
                    placed_size,
                    false,
                )
                .into(),
            );
        }
        if slice.size() > 0 || from.pos() != self.to.pos() {
            return Some(ReplaceStep::new(from.pos(), to.pos(), slice, false).into());
        }
        None
    }

    /// Finds a slice depth with content that fits somewhere on the
    /// frontier. The first pass only accepts direct fits (possibly after
    /// filler nodes), the second allows wrapping.
    fn find_fittable(&self) -> Option<Fittable> {
        let mut start_depth = self.unplaced.open_start();
        let mut cur = self.unplaced.content().clone();
        let mut open_end = self.unplaced.open_end();
        for d in 0..start_depth {
            let node = cur.first_child()?.clone();
            if cur.child_count() > 1 {
                open_end = 0;
            }
            if node.node_type().is_isolating() && open_end <= d {
                start_depth = d;
                break;
            }
            cur = node.content().clone();
        }

        for pass in 1..=2 {
            let top = if pass == 1 {
                start_depth
            } else {
                self.unplaced.open_start()
            };
            for slice_depth in (0..=top).rev() {
                let (fragment, parent) = if slice_depth > 0 {
                    let parent = content_at(self.unplaced.content(), slice_depth - 1)
                        .first_child()?
                        .clone();
                    (parent.content().clone(), Some(parent))
                } else {
                    (self.unplaced.content().clone(), None)
                };
                let first = fragment.first_child();
                for frontier_depth in (0..=self.depth()).rev() {
                    let Frontier {
                        node_type,
                        content_match,
                    } = &self.frontier[frontier_depth];
                    if pass == 1 {
                        // `Some(inject)` when content fits here.
                        let fits = match first {
                            Some(first) if content_match.match_type(first.node_type()).is_some() => {
                                Some(None)
                            }
                            Some(first) => content_match
                                .fill_before(&Fragment::from(first.clone()), false, 0)
                                .map(Some),
                            None => parent
                                .as_ref()
                                .filter(|p| node_type.compatible_content(p.node_type()))
                                .map(|_| None),
                        };
                        if let Some(inject) = fits {
                            return Some(Fittable {
                                slice_depth,
                                frontier_depth,
                                parent,
                                inject,
                                wrap: None,
                            });
                        }
                    } else if let Some(wrap) =
                        first.and_then(|f| content_match.find_wrapping(f.node_type()))
                    {
                        return Some(Fittable {
                            slice_depth,
                            frontier_depth,
                            parent,
                            inject: None,
                            wrap: Some(wrap),
                        });
                    }
                    // Stop going up once the parent itself would fit here.
                    if parent
                        .as_ref()
                        .is_some_and(|p| content_match.match_type(p.node_type()).is_some())
                    {
                        break;
                    }
                }
            }
        }
        None
    }

    fn open_more(&mut self) -> bool {
        let content = self.unplaced.content().clone();
        let open_start = self.unplaced.open_start();
        let open_end = self.unplaced.open_end();
        let inner = content_at(&content, open_start);
        match inner.first_child() {
            None => return false,
            Some(first) if first.is_leaf() => return false,
            Some(_) => {}
        }
        let reaches_end = inner.size() + open_start >= content.size().saturating_sub(open_end);
        let new_end = if reaches_end { open_start + 1 } else { 0 };
        self.unplaced = Slice::new(content, open_start + 1, open_end.max(new_end));
        true
    }

    fn drop_node(&mut self) {
        let content = self.unplaced.content().clone();
        let open_start = self.unplaced.open_start();
        let open_end = self.unplaced.open_end();
        let inner = content_at(&content, open_start);
        self.unplaced = if inner.child_count() <= 1 && open_start > 0 {
            let open_at_end = content.size() - open_start <= open_start + inner.size();
            Slice::new(
                drop_from_fragment(&content, open_start - 1, 1),
                open_start - 1,
                if open_at_end { open_start - 1 } else { open_end },
            )
        } else {
            Slice::new(drop_from_fragment(&content, open_start, 1), open_start, open_end)
        };
    }

    /// Moves content from the unplaced slice at `slice_depth` onto the
    /// frontier node at `frontier_depth`.
    fn place_nodes(&mut self, fit: Fittable) -> Option<()> {
        let Fittable {
            slice_depth,
            frontier_depth,
            parent,
            inject,
            wrap,
        } = fit;
        while self.depth() > frontier_depth {
            self.close_frontier_node();
        }
        for wrapper in wrap.iter().flatten() {
            self.open_frontier_node(wrapper, None, None)?;
        }

        let slice = self.unplaced.clone();
        let fragment = match &parent {
            Some(parent) => parent.content().clone(),
            None => slice.content().clone(),
        };
        let open_start = slice.open_start() - slice_depth;
        let mut taken = 0;
        let mut add = Vec::new();
        let node_type = self.frontier[frontier_depth].node_type.clone();
        let mut content_match = self.frontier[frontier_depth].content_match.clone();
        if let Some(inject) = &inject {
            add.extend(inject.iter().cloned());
            content_match = content_match.match_fragment(inject)?;
        }
        // Open nodes at the end of the fragment: 0 means the fragment's
        // parent is open, negative means nothing is.
        let mut open_end_count = (fragment.size() + slice_depth) as isize
            - (slice.content().size() - slice.open_end()) as isize;
        while taken < fragment.child_count() {
            let next = fragment.child(taken);
            let Some(matches) = content_match.match_type(next.node_type()) else {
                break;
            };
            taken += 1;
            // Empty open nodes are dropped.
            if taken > 1 || open_start == 0 || next.content().size() > 0 {
                content_match = matches;
                let marked = next.mark(node_type.allowed_marks(next.marks()));
                let node_open_start = if taken == 1 { open_start } else { 0 };
                let node_open_end = if taken == fragment.child_count() {
                    open_end_count
                } else {
                    -1
                };
                add.push(close_node_start(marked, node_open_start, node_open_end));
            }
        }
        let to_end = taken == fragment.child_count();
        if !to_end {
            open_end_count = -1;
        }

        self.placed = add_to_fragment(&self.placed, frontier_depth, &Fragment::from_array(add));
        self.frontier[frontier_depth].content_match = content_match;

        // A fully placed, closed node of the frontier's own type closes
        // that frontier node right away.
        if to_end
            && open_end_count < 0
            && parent
                .as_ref()
                .is_some_and(|p| *p.node_type() == self.frontier[self.depth()].node_type)
            && self.frontier.len() > 1
        {
            self.close_frontier_node();
        }

        let mut cur = fragment;
        for _ in 0..open_end_count.max(0) {
            let node = cur.last_child()?.clone();
            self.frontier.push(Frontier {
                node_type: node.node_type().clone(),
                content_match: node.content_match_at(node.child_count()).ok()?,
            });
            cur = node.content().clone();
        }

        self.unplaced = if !to_end {
            Slice::new(
                drop_from_fragment(slice.content(), slice_depth, taken),
                slice.open_start(),
                slice.open_end(),
            )
        } else if slice_depth == 0 {
            Slice::empty()
        } else {
            Slice::new(
                drop_from_fragment(slice.content(), slice_depth - 1, 1),
                slice_depth - 1,
                if open_end_count < 0 {
                    slice.open_end()
                } else {
                    slice_depth - 1
                },
            )
        };
        Some(())
    }

    /// Position after the textblock whose inline content must be moved
    /// into the frontier, if any.
    fn must_move_inline(&self) -> Option<usize> {
        if !self.to.parent().is_textblock() || self.to.depth() == 0 {
            return None;
        }
        let top = &self.frontier[self.depth()];
        if !top.node_type.is_textblock()
            || content_after_fits(
                &self.to,
                self.to.depth(),
                &top.node_type,
                &top.content_match,
                false,
            )
            .is_none()
        {
            return None;
        }
        if self.to.depth() == self.depth()
            && self
                .find_close_level(&self.to)
                .is_some_and(|level| level.depth == self.depth())
        {
            return None;
        }
        let mut depth = self.to.depth();
        let mut after = self.to.after(depth);
        while depth > 1 {
            depth -= 1;
            if after != self.to.end(depth) {
                break;
            }
            after += 1;
        }
        Some(after)
    }

    fn find_close_level(&self, to: &ResolvedPos) -> Option<CloseLevel> {
        'scan: for i in (0..=self.depth().min(to.depth())).rev() {
            let Frontier {
                node_type,
                content_match,
            } = &self.frontier[i];
            let drop_inner = i < to.depth() && to.end(i + 1) == to.pos() + (to.depth() - (i + 1));
            let Some(fit) = content_after_fits(to, i, node_type, content_match, drop_inner) else {
                continue;
            };
            for d in (0..i).rev() {
                let Frontier {
                    node_type,
                    content_match,
                } = &self.frontier[d];
                match content_after_fits(to, d, node_type, content_match, true) {
                    Some(matches) if matches.child_count() == 0 => {}
                    _ => continue 'scan,
                }
            }
            let move_to = if drop_inner {
                to.doc().resolve(to.after(i + 1)).ok()?
            } else {
                to.clone()
            };
            return Some(CloseLevel {
                depth: i,
                fit,
                move_to,
            });
        }
        None
    }

    fn close(&mut self, to: ResolvedPos) -> Option<ResolvedPos> {
        let close = self.find_close_level(&to)?;
        while self.depth() > close.depth {
            self.close_frontier_node();
        }
        if close.fit.child_count() > 0 {
            self.placed = add_to_fragment(&self.placed, close.depth, &close.fit);
        }
        let to = close.move_to;
        for d in close.depth + 1..=to.depth() {
            let node = to.node(d);
            let add = node
                .node_type()
                .content_match()
                .fill_before(node.content(), true, to.index(d))?;
            self.open_frontier_node(node.node_type(), Some(node.attrs()), Some(add))?;
        }
        Some(to)
    }

    fn open_frontier_node(
        &mut self,
        node_type: &NodeType,
        attrs: Option<&Attrs>,
        content: Option<Fragment>,
    ) -> Option<()> {
        let depth = self.depth();
        let top = &mut self.frontier[depth];
        top.content_match = top.content_match.match_type(node_type)?;
        let node = node_type
            .create(attrs, content.unwrap_or_default(), &[])
            .ok()?;
        self.placed = add_to_fragment(&self.placed, depth, &Fragment::from(node));
        self.frontier.push(Frontier {
            node_type: node_type.clone(),
            content_match: node_type.content_match(),
        });
        Some(())
    }

    fn close_frontier_node(&mut self) {
        let Some(open) = self.frontier.pop() else {
            return;
        };
        if let Some(add) = open
            .content_match
            .fill_before(&Fragment::empty(), true, 0)
            .filter(|add| add.child_count() > 0)
        {
            self.placed = add_to_fragment(&self.placed, self.frontier.len(), &add);
        }
    }
}

fn drop_from_fragment(fragment: &Fragment, depth: usize, count: usize) -> Fragment {
    if depth == 0 {
        let n = fragment.child_count();
        return fragment.cut_by_index(count.min(n), n);
    }
    match fragment.first_child() {
        Some(first) => fragment.replace_child(
            0,
            first.copy(drop_from_fragment(first.content(), depth - 1, count)),
        ),
        None => fragment.clone(),
    }
}

fn add_to_fragment(fragment: &Fragment, depth: usize, content: &Fragment) -> Fragment {
    if depth == 0 {
        return fragment.append(content);
    }
    match fragment.last_child() {
        Some(last) => fragment.replace_child(
            fragment.child_count() - 1,
            last.copy(add_to_fragment(last.content(), depth - 1, content)),
        ),
        None => fragment.clone(),
    }
}

fn content_at(fragment: &Fragment, depth: usize) -> Fragment {
    let mut fragment = fragment.clone();
    for _ in 0..depth {
        match fragment.first_child() {
            Some(first) => fragment = first.content().clone(),
            None => break,
        }
    }
    fragment
}

/// Fills the open start (and, when `open_end <= 0`, the end) of a node
/// taken from the open side of a slice so it becomes valid on its own.
fn close_node_start(node: Node, open_start: usize, open_end: isize) -> Node {
    if open_start == 0 {
        return node;
    }
    let mut frag = node.content().clone();
    if open_start > 1 {
        if let Some(first) = frag.first_child().cloned() {
            let inner_end = if frag.child_count() == 1 { open_end - 1 } else { 0 };
            frag = frag.replace_child(0, close_node_start(first, open_start - 1, inner_end));
        }
    }
    let start = node.node_type().content_match();
    if let Some(before) = start.fill_before(&frag, false, 0) {
        frag = before.append(&frag);
    }
    if open_end <= 0 {
        if let Some(after) = start
            .match_fragment(&frag)
            .and_then(|m| m.fill_before(&Fragment::empty(), true, 0))
        {
            frag = frag.append(&after);
        }
    }
    node.copy(frag)
}

/// Content needed before the rest of `to`'s ancestor at `depth` so that it
/// fits after `content_match`, if any.
fn content_after_fits(
    to: &ResolvedPos,
    depth: usize,
    node_type: &NodeType,
    content_match: &ContentMatch,
    open: bool,
) -> Option<Fragment> {
    let node = to.node(depth);
    let index = if open {
        to.index_after(depth)
    } else {
        to.index(depth)
    };
    if index == node.child_count() && !node_type.compatible_content(node.node_type()) {
        return None;
    }
    let fit = content_match.fill_before(node.content(), true, index)?;
    (!invalid_marks(node_type, node.content(), index)).then_some(fit)
}

fn invalid_marks(node_type: &NodeType, fragment: &Fragment, start: usize) -> bool {
    fragment.children()[start.min(fragment.child_count())..]
        .iter()
        .any(|child| !node_type.allows_marks(child.marks()))
}

/// Depths at which `rfrom..rto` spans the whole content of a node.
fn covered_depths(rfrom: &ResolvedPos, rto: &ResolvedPos) -> Vec<usize> {
    let mut result = Vec::new();
    let min_depth = rfrom.depth().min(rto.depth());
    for d in (0..=min_depth).rev() {
        let start = rfrom.start(d);
        if start < rfrom.pos() - (rfrom.depth() - d)
            || rto.end(d) > rto.pos() + (rto.depth() - d)
            || rfrom.node(d).node_type().is_isolating()
            || rto.node(d).node_type().is_isolating()
        {
            break;
        }
        let joined_textblocks = d == rfrom.depth()
            && d == rto.depth()
            && rfrom.parent().inline_content()
            && rto.parent().inline_content()
            && d > 0
            && rto.start(d - 1) == start - 1;
        if start == rto.start(d) || joined_textblocks {
            result.push(d);
        }
    }
    result
}

/// Replaces a range, expanding it to cover whole parent nodes when the
/// slice's open depth suggests it and the nodes are not defining.
pub(crate) fn replace_range(
    tr: &mut Transform,
    from: usize,
    to: usize,
    slice: &Slice,
) -> Result<(), TransformError> {
    if slice.size() == 0 {
        return delete_range(tr, from, to);
    }
    let doc = tr.doc().clone();
    let rfrom = doc.resolve(from)?;
    let rto = doc.resolve(to)?;
    if fits_trivially(&rfrom, &rto, slice) {
        tr.step(ReplaceStep::new(from, to, slice.clone(), false).into())?;
        return Ok(());
    }

    let mut target_depths: Vec<isize> = covered_depths(&rfrom, &rto)
        .into_iter()
        .map(|d| d as isize)
        .collect();
    // The whole document cannot be replaced.
    if target_depths.last() == Some(&0) {
        target_depths.pop();
    }
    // A negative depth -d replaces from before(d) to `to` instead of
    // covering the whole node at d.
    let mut preferred_target = -((rfrom.depth() + 1) as isize);
    target_depths.insert(0, preferred_target);
    for d in (1..=rfrom.depth()).rev() {
        let pos = rfrom.pos() - 1 - (rfrom.depth() - d);
        let node_type = rfrom.node(d).node_type();
        if node_type.is_defining_as_context() || node_type.is_isolating() {
            break;
        }
        if target_depths.contains(&(d as isize)) {
            preferred_target = d as isize;
        } else if rfrom.before(d) == pos {
            target_depths.insert(1, -(d as isize));
        }
    }
    let preferred_target_index = target_depths
        .iter()
        .position(|&t| t == preferred_target)
        .unwrap_or(0);

    let mut left_nodes = Vec::new();
    let mut content = slice.content().clone();
    for i in 0.. {
        let Some(node) = content.first_child().cloned() else {
            break;
        };
        left_nodes.push(node.clone());
        if i == slice.open_start() {
            break;
        }
        content = node.content().clone();
    }

    // Back up to cover defining textblocks directly above the preferred
    // depth, possibly skipping one non-defining textblock.
    let mut preferred_depth = slice.open_start();
    let context_depth = preferred_target.unsigned_abs() - 1;
    for d in (0..preferred_depth).rev() {
        let Some(left) = left_nodes.get(d) else {
            continue;
        };
        let defines = left.node_type().is_defining_for_content();
        if defines && !left.same_markup(rfrom.node(context_depth)) {
            preferred_depth = d;
        } else if defines || !left.node_type().is_textblock() {
            break;
        }
    }

    let open_start = slice.open_start();
    for j in (0..=open_start).rev() {
        let open_depth = (j + preferred_depth + 1) % (open_start + 1);
        let Some(insert) = left_nodes.get(open_depth) else {
            continue;
        };
        for i in 0..target_depths.len() {
            let target = target_depths[(i + preferred_target_index) % target_depths.len()];
            let expand = target >= 0;
            let target_depth = target.unsigned_abs();
            let parent = rfrom.node(target_depth - 1);
            let index = rfrom.index(target_depth - 1);
            if parent.can_replace_with(index, index, insert.node_type(), Some(insert.marks())) {
                let end = if expand { rto.after(target_depth) } else { to };
                let closed = Slice::new(
                    close_fragment(slice.content(), 0, open_start, open_depth, None),
                    open_depth,
                    slice.open_end(),
                );
                tr.replace(rfrom.before(target_depth), end, &closed)?;
                return Ok(());
            }
        }
    }

    let start_steps = tr.steps().len();
    let (mut from, mut to) = (from, to);
    for &depth in target_depths.iter().rev() {
        tr.replace(from, to, slice)?;
        if tr.steps().len() > start_steps {
            break;
        }
        if depth < 0 {
            continue;
        }
        from = rfrom.before(depth as usize);
        to = rto.after(depth as usize);
    }
    Ok(())
}

fn close_fragment(
    fragment: &Fragment,
    depth: usize,
    old_open: usize,
    new_open: usize,
    parent: Option<&Node>,
) -> Fragment {
    let mut fragment = fragment.clone();
    if depth < old_open {
        if let Some(first) = fragment.first_child().cloned() {
            let inner = close_fragment(first.content(), depth + 1, old_open, new_open, Some(&first));
            fragment = fragment.replace_child(0, first.copy(inner));
        }
    }
    if depth > new_open {
        if let Some(start_match) = parent.and_then(|p| p.content_match_at(0).ok()) {
            let start = match start_match.fill_before(&fragment, false, 0) {
                Some(before) => before.append(&fragment),
                None => fragment.clone(),
            };
            let end = start_match
                .match_fragment(&start)
                .and_then(|m| m.fill_before(&Fragment::empty(), true, 0))
                .unwrap_or_default();
            fragment = start.append(&end);
        }
    }
    fragment
}

/// Replaces a range with a single node, moving an empty insertion point
/// inside a block to the nearest place where the node fits.
pub(crate) fn replace_range_with(
    tr: &mut Transform,
    from: usize,
    to: usize,
    node: Node,
) -> Result<(), TransformError> {
    let (mut from, mut to) = (from, to);
    if !node.is_inline() && from == to && tr.doc().resolve(from)?.parent().content().size() > 0 {
        if let Some(point) = insert_point(tr.doc(), from, node.node_type()) {
            from = point;
            to = point;
        }
    }
    replace_range(tr, from, to, &Slice::new(Fragment::from(node), 0, 0))
}

/// Deletes a range, widening it to whole nodes when that leaves a cleaner
/// document.
pub(crate) fn delete_range(tr: &mut Transform, from: usize, to: usize) -> Result<(), TransformError> {
    let doc = tr.doc().clone();
    let rfrom = doc.resolve(from)?;
    let rto = doc.resolve(to)?;
    let covered = covered_depths(&rfrom, &rto);
    for (i, &depth) in covered.iter().enumerate() {
        let last = i == covered.len() - 1;
        if (last && depth == 0) || rfrom.node(depth).node_type().content_match().valid_end() {
            tr.delete(rfrom.start(depth), rto.end(depth))?;
            return Ok(());
        }
        if depth > 0
            && (last
                || rfrom.node(depth - 1).can_replace(
                    rfrom.index(depth - 1),
                    rto.index_after(depth - 1),
                    &Fragment::empty(),
                ))
        {
            tr.delete(rfrom.before(depth), rto.after(depth))?;
            return Ok(());
        }
    }
    for d in 1..=rfrom.depth().min(rto.depth()) {
        if from - rfrom.start(d) == rfrom.depth() - d
            && to > rfrom.end(d)
            && rto.end(d) - to != rto.depth() - d
            && rfrom.start(d - 1) == rto.start(d - 1)
            && rfrom.node(d - 1).can_replace(
                rfrom.index(d - 1),
                rto.index(d - 1),
                &Fragment::empty(),
            )
        {
            tr.delete(rfrom.before(d), to)?;
            return Ok(());
        }
    }
    tr.delete(from, to)?;
    Ok(())
}
