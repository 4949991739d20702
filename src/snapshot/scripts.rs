//! In-page scripts evaluated through [`super::PageDriver::evaluate`].
//!
//! Every script opens with a `/* cf:... */` marker so drivers and test fakes
//! can tell them apart.

pub const MARKER_QUIESCENCE: &str = "cf:quiescence";
pub const MARKER_EXPAND: &str = "cf:expand";
pub const MARKER_EXTRACT: &str = "cf:extract";
pub const MARKER_CLICK_PREVIEW: &str = "cf:click-preview";
pub const MARKER_PREVIEW_SOURCE: &str = "cf:preview-source";
pub const MARKER_CLOSE_PREVIEW: &str = "cf:close-preview";

/// `{ready, resources}`: document ready state and resource entry count.
pub const QUIESCENCE_PROBE: &str = r#"/* cf:quiescence */
(() => ({
  ready: document.readyState,
  resources: performance.getEntriesByType('resource').length
}))()"#;

/// Click the next collapsed section not clicked before. Returns whether
/// anything was clicked.
pub const EXPAND_NEXT: &str = r#"/* cf:expand */
(() => {
  const sel = [
    '[aria-expanded="false"]',
    '.accordion-button.collapsed',
    '.collapsed',
    '[data-toggle="collapse"]',
    '[data-bs-toggle="collapse"]',
    '.expandable:not(.expanded)',
    'details:not([open]) > summary'
  ].join(',');
  const el = Array.from(document.querySelectorAll(sel)).find(e =>
    !e.hasAttribute('data-cf-expanded') &&
    e.getAttribute('aria-expanded') !== 'true' &&
    e.offsetParent !== null);
  if (!el) return false;
  el.setAttribute('data-cf-expanded', '1');
  try { el.click(); } catch (e) {}
  return true;
})()"#;

/// Structured extraction of links, iframes, file rows, name labels and
/// inline script text.
pub const EXTRACT: &str = r#"/* cf:extract */
(() => {
  const clean = (s, max) => (s || '').replace(/\s+/g, ' ').trim().slice(0, max || 300);
  const classOf = (el) => (typeof el.className === 'string' ? el.className : '');
  const MARKERS = ['file', 'material', 'download', 'archivo', 'adjunto'];
  const SUBPARTS = ['name', 'title', 'label', 'icon', 'size', 'date', 'type', 'input', 'upload', 'nombre', 'titulo'];
  const isRowClass = (cls) => cls.split(/\s+/).some(t => {
    t = t.toLowerCase();
    return MARKERS.some(m => t.includes(m)) && !SUBPARTS.some(s => t.includes(s));
  });
  const isNameClass = (cls) => cls.split(/\s+/).some(t => {
    t = t.toLowerCase();
    return (t.includes('file') || t.includes('material') || t.includes('archivo')) &&
      (t.includes('name') || t.includes('title') || t.includes('nombre'));
  });
  const hrefOf = (a) => {
    const raw = (a.getAttribute('href') || '').trim();
    return raw.toLowerCase().startsWith('javascript:') ? raw : (a.href || raw);
  };
  const linkOf = (a) => {
    const holder = a.closest('[data-id]');
    const block = a.closest('li, tr, p, div') || a.parentElement;
    return {
      href: hrefOf(a),
      text: clean(a.innerText || a.textContent || a.title, 200),
      context: clean(block ? block.innerText : '', 200),
      onclick: a.getAttribute('onclick'),
      data_id: a.getAttribute('data-id') || (holder ? holder.getAttribute('data-id') : null)
    };
  };

  const links = Array.from(document.querySelectorAll('a[href], a[onclick]')).map(linkOf);
  const iframes = Array.from(document.querySelectorAll('iframe[src], embed[src], object[data]'))
    .map(f => f.src || f.data || f.getAttribute('src') || f.getAttribute('data'))
    .filter(Boolean);

  const LEAF_TAGS = ['A', 'BUTTON', 'INPUT', 'IMG', 'I', 'SVG', 'SCRIPT', 'STYLE', 'OPTION'];
  const candidates = Array.from(document.querySelectorAll('[class], [data-id]'))
    .filter(el => !LEAF_TAGS.includes(el.tagName.toUpperCase()))
    .filter(el => el.hasAttribute('data-id') || isRowClass(classOf(el)))
    .slice(0, 3000);
  const chainOnly = (el) => {
    const inner = candidates.filter(o => o !== el && el.contains(o));
    return inner.every(o => inner.every(p => p === o || p.contains(o) || o.contains(p)));
  };
  const rowish = candidates.filter(chainOnly);
  const rows = rowish.filter(el => !rowish.some(o => o !== el && o.contains(el)));

  const file_items = rows.slice(0, 500).map(el => {
    const idHolder = el.hasAttribute('data-id') ? el : el.querySelector('[data-id]');
    const buttons = Array.from(el.querySelectorAll('button, [onclick], [data-action], .btn'))
      .filter(b => !(b.tagName === 'A' && (b.getAttribute('href') || '').trim() && !(b.getAttribute('href') || '').trim().startsWith('#') && !(b.getAttribute('href') || '').trim().toLowerCase().startsWith('javascript:')))
      .map(b => ({
        action: b.getAttribute('onclick') || b.getAttribute('data-action') || '',
        id: b.getAttribute('data-id') || b.id || null,
        text: clean(b.innerText || b.title || b.getAttribute('aria-label'), 100)
      }));
    return {
      data_id: idHolder ? idHolder.getAttribute('data-id') : null,
      text: clean(el.innerText || el.textContent, 300),
      class_name: classOf(el),
      links: Array.from(el.querySelectorAll('a[href]'))
        .filter(a => !(a.getAttribute('href') || '').trim().startsWith('#'))
        .map(linkOf),
      buttons
    };
  });

  const nameEls = Array.from(document.querySelectorAll('[class]')).filter(el => isNameClass(classOf(el)));
  const material_names = nameEls
    .filter(el => !nameEls.some(o => o !== el && el.contains(o)))
    .map(el => clean(el.innerText || el.textContent, 200))
    .filter(Boolean);

  const scripts = Array.from(document.querySelectorAll('script:not([src])'))
    .map(s => (s.textContent || '').slice(0, 100000))
    .filter(t => t.trim().length > 0)
    .slice(0, 50);

  return { url: location.href, title: document.title, links, iframes, file_items, material_names, scripts };
})()"#;

/// Sources of frames, embeds and players currently in the document.
pub const PREVIEW_SOURCE: &str = r#"/* cf:preview-source */
(() => Array.from(document.querySelectorAll('iframe[src], embed[src], object[data], video[src], video source[src]'))
  .map(f => f.src || f.data || f.getAttribute('src') || f.getAttribute('data'))
  .filter(Boolean))()"#;

/// Close an open preview dialog, falling back to an Escape key event.
pub const CLOSE_PREVIEW: &str = r#"/* cf:close-preview */
(() => {
  const btn = document.querySelector([
    '.modal.show .close',
    '.modal.show [data-dismiss="modal"]',
    '.modal.show [data-bs-dismiss="modal"]',
    '[role="dialog"] [aria-label="Close"]',
    '.modal-close',
    '.close-preview'
  ].join(','));
  if (btn) { btn.click(); return true; }
  document.dispatchEvent(new KeyboardEvent('keydown', { key: 'Escape', bubbles: true }));
  return false;
})()"#;

/// Click the preview control of the row with `data-id == id`.
pub fn click_preview(data_id: &str) -> String {
    let id = serde_json::Value::String(data_id.to_string());
    format!(
        r#"/* cf:click-preview */
((id) => {{
  const row = Array.from(document.querySelectorAll('[data-id]')).find(e => e.getAttribute('data-id') === id);
  if (!row) return false;
  const ctl = row.matches('button, a, [onclick]') ? row :
    (row.querySelector('[onclick*="preview" i], [onclick*="ver" i], .preview, .btn-preview, button, [onclick], a') || row);
  ctl.click();
  return true;
}})({})"#,
        id
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripts_carry_markers() {
        for (script, marker) in [
            (QUIESCENCE_PROBE, MARKER_QUIESCENCE),
            (EXPAND_NEXT, MARKER_EXPAND),
            (EXTRACT, MARKER_EXTRACT),
            (PREVIEW_SOURCE, MARKER_PREVIEW_SOURCE),
            (CLOSE_PREVIEW, MARKER_CLOSE_PREVIEW),
        ] {
            assert!(script.starts_with(&format!("/* {} */", marker)));
        }
        assert!(click_preview("7").contains(MARKER_CLICK_PREVIEW));
    }

    #[test]
    fn test_click_preview_escapes_id() {
        let script = click_preview(r#"a"b"#);
        assert!(script.ends_with(r#"})("a\"b")"#));
    }
}
