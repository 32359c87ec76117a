use unicode_segmentation::UnicodeSegmentation;

/// Splits `text` into windows of at most `chunk_chars` characters, cut on word boundaries.
///
/// Consecutive windows share up to `overlap_chars` characters of trailing context. A single word
/// longer than a window is cut on character boundaries. Windows are trimmed; blank ones are
/// dropped.
pub fn split_windows(text: &str, chunk_chars: usize, overlap_chars: usize) -> Vec<String> {
	let chunk_chars = chunk_chars.max(1);
	let overlap_chars = overlap_chars.min(chunk_chars - 1);
	let mut windows = Vec::new();
	let mut current: Vec<(&str, usize)> = Vec::new();
	let mut current_len = 0;

	for piece in pieces(text, chunk_chars) {
		let len = piece.chars().count();

		if current_len + len > chunk_chars && !current.is_empty() {
			push_window(&mut windows, &current);

			let mut carried_len = 0;
			let keep = current
				.iter()
				.rev()
				.take_while(|(_, piece_len)| {
					carried_len += piece_len;

					carried_len <= overlap_chars
				})
				.count();

			current.drain(..current.len() - keep);

			while current.first().is_some_and(|(first, _)| first.trim().is_empty()) {
				current.remove(0);
			}

			current_len = current.iter().map(|(_, piece_len)| piece_len).sum();

			while current_len + len > chunk_chars && !current.is_empty() {
				current_len -= current.remove(0).1;
			}
		}
		if current.is_empty() && piece.trim().is_empty() {
			continue;
		}

		current.push((piece, len));

		current_len += len;
	}

	if !current.is_empty() {
		push_window(&mut windows, &current);
	}

	windows
}

/// Text content of an HTML fragment: tags become spaces, common entities are decoded, and
/// whitespace runs collapse to one space.
pub fn plain_text(html: &str) -> String {
	let mut stripped = String::with_capacity(html.len());
	let mut in_tag = false;

	for ch in html.chars() {
		match ch {
			'<' => in_tag = true,
			'>' if in_tag => {
				in_tag = false;

				stripped.push(' ');
			},
			_ if !in_tag => stripped.push(ch),
			_ => {},
		}
	}

	let decoded = ENTITIES
		.iter()
		.fold(stripped, |text, (entity, replacement)| text.replace(entity, replacement));

	decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

const ENTITIES: [(&str, &str); 6] = [
	("&nbsp;", " "),
	("&lt;", "<"),
	("&gt;", ">"),
	("&quot;", "\""),
	("&#39;", "'"),
	("&amp;", "&"),
];

/// Word-bound segments, with any segment longer than `max_chars` cut into character runs.
fn pieces(text: &str, max_chars: usize) -> Vec<&str> {
	let mut out = Vec::new();

	for segment in text.split_word_bounds() {
		let mut start = 0;

		for (count, (offset, _)) in segment.char_indices().enumerate() {
			if count > 0 && count % max_chars == 0 {
				out.push(&segment[start..offset]);

				start = offset;
			}
		}

		out.push(&segment[start..]);
	}

	out
}

fn push_window(windows: &mut Vec<String>, pieces: &[(&str, usize)]) {
	let window: String = pieces.iter().map(|(piece, _)| *piece).collect();
	let trimmed = window.trim();

	if !trimmed.is_empty() {
		windows.push(trimmed.to_string());
	}
}
