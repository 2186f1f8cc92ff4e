//! Render-time grouping of flat fields into labelled sections
//!
//! Grouping works on working names held in a side table for the duration of
//! one [`organize_by_fieldsets`] call. Fields themselves are never renamed.

use crate::hierarchy::ARRAY_ITEM_MARKER;
use crate::render::{RenderSink, escape_html, humanize};
use indexmap::IndexMap;

/// One node of the grouping tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fieldset {
	/// Index of the field in the slice handed to [`organize_by_fieldsets`].
	Leaf(usize),
	Group {
		key: String,
		title: String,
		children: Vec<Fieldset>,
	},
}

/// Groups fields by the first `.`-delimited segment of their names, recursively.
///
/// A group with a single member collapses to that member.
///
/// # Examples
///
/// ```
/// use formage_forms::fieldset::{Fieldset, organize_by_fieldsets};
///
/// let tree = organize_by_fieldsets(&["title", "seo.title", "seo.keywords", "author.name"]);
///
/// assert_eq!(tree[0], Fieldset::Leaf(0));
/// assert!(matches!(&tree[1], Fieldset::Group { title, children, .. }
///     if title == "Seo" && children.len() == 2));
/// assert_eq!(tree[2], Fieldset::Leaf(3));
/// ```
pub fn organize_by_fieldsets(names: &[&str]) -> Vec<Fieldset> {
	let working: Vec<(usize, &str)> = names.iter().copied().enumerate().collect();
	group(&working)
}

fn group(working: &[(usize, &str)]) -> Vec<Fieldset> {
	// Exhausted names sit at their own position; everything else is keyed
	// by first segment, placed where the key first appears.
	let mut groups: IndexMap<&str, Vec<(usize, &str)>> = IndexMap::new();
	let mut order: Vec<Result<&str, usize>> = Vec::new();

	for &(index, name) in working {
		if name.is_empty() {
			order.push(Err(index));
			continue;
		}
		let (head, rest) = name.split_once('.').unwrap_or((name, ""));
		if !groups.contains_key(head) {
			order.push(Ok(head));
		}
		groups.entry(head).or_default().push((index, rest));
	}

	order
		.into_iter()
		.filter_map(|slot| match slot {
			Err(index) => Some(Fieldset::Leaf(index)),
			Ok(head) => groups.get(head).map(|members| match members.as_slice() {
				[(only, _)] => Fieldset::Leaf(*only),
				members => Fieldset::Group {
					key: head.to_string(),
					title: humanize(head.trim_end_matches(ARRAY_ITEM_MARKER)),
					children: group(members),
				},
			}),
		})
		.collect()
}

/// Markup used for the sections of a grouping tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldsetLayout {
	pub section_class: &'static str,
	/// Wrap the members of every level in a bare `<div>`.
	pub body_wrapper: bool,
}

/// Top-level form sections, collapsed until opened.
pub const FORM_LAYOUT: FieldsetLayout = FieldsetLayout {
	section_class: "nf_fieldset toplevel closed",
	body_wrapper: true,
};

pub const SUB_FORM_LAYOUT: FieldsetLayout = FieldsetLayout {
	section_class: "nf_fieldset",
	body_wrapper: false,
};

/// Writes a grouping tree, leaves through `render_leaf`.
pub fn render_fieldsets<F>(
	tree: &[Fieldset],
	sink: &mut dyn RenderSink,
	layout: FieldsetLayout,
	render_leaf: &mut F,
) where
	F: FnMut(usize, &mut dyn RenderSink),
{
	if layout.body_wrapper {
		sink.write("<div>\n");
	}
	for node in tree {
		match node {
			Fieldset::Leaf(index) => render_leaf(*index, sink),
			Fieldset::Group {
				title, children, ..
			} => {
				sink.write(&format!(
					"<div class=\"{}\">\n<h2>{}</h2>\n",
					layout.section_class,
					escape_html(title)
				));
				render_fieldsets(children, sink, layout, render_leaf);
				sink.write("</div>\n");
			}
		}
	}
	if layout.body_wrapper {
		sink.write("</div>\n");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use rstest::rstest;

	fn titles(tree: &[Fieldset]) -> Vec<String> {
		tree.iter()
			.map(|node| match node {
				Fieldset::Leaf(i) => format!("#{i}"),
				Fieldset::Group { title, children, .. } => {
					format!("{title}[{}]", titles(children).join(","))
				}
			})
			.collect()
	}

	#[rstest]
	fn test_groups_keep_first_appearance_order() {
		// Arrange
		let names = ["seo.title", "body", "seo.keywords", "meta.a.x", "meta.a.y", "meta.b"];

		// Act
		let tree = organize_by_fieldsets(&names);

		// Assert
		assert_eq!(titles(&tree), ["Seo[#0,#2]", "#1", "Meta[A[#3,#4],#5]"]);
	}

	#[rstest]
	fn test_single_member_group_passes_through() {
		let tree = organize_by_fieldsets(&["address.street", "title"]);
		assert_eq!(tree, vec![Fieldset::Leaf(0), Fieldset::Leaf(1)]);
	}

	#[rstest]
	fn test_array_marker_is_dropped_from_title() {
		let tree = organize_by_fieldsets(&["authors[].name", "authors[].email"]);
		assert_eq!(titles(&tree), ["Authors[#0,#1]"]);
	}

	#[rstest]
	fn test_render_form_layout() {
		// Arrange
		let names = ["title", "seo.title", "seo.keywords"];
		let tree = organize_by_fieldsets(&names);
		let mut out = String::new();

		// Act
		render_fieldsets(&tree, &mut out, FORM_LAYOUT, &mut |i, sink| {
			sink.write(&format!("[{}]\n", names[i]));
		});

		// Assert
		assert_eq!(
			out,
			"<div>\n[title]\n<div class=\"nf_fieldset toplevel closed\">\n<h2>Seo</h2>\n\
			 <div>\n[seo.title]\n[seo.keywords]\n</div>\n</div>\n</div>\n"
		);
	}

	#[rstest]
	fn test_render_sub_form_layout() {
		let names = ["geo.lat", "geo.lng"];
		let tree = organize_by_fieldsets(&names);
		let mut out = String::new();
		render_fieldsets(&tree, &mut out, SUB_FORM_LAYOUT, &mut |i, sink| {
			sink.write(names[i]);
		});
		assert_eq!(out, "<div class=\"nf_fieldset\">\n<h2>Geo</h2>\ngeo.latgeo.lng</div>\n");
	}
}
