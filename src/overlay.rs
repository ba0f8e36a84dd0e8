//! In-page script behind the floating panel: the two user triggers, the
//! hover-highlight selection loop, the scope snapshot and the element helpers
//! the control driver calls into. Everything hangs off `window.__formAutofill`.

use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use chromiumoxide::page::Page as CrPage;

use crate::error::{Error, Result};

/// Name of the global the script installs.
pub const OVERLAY_GLOBAL: &str = "window.__formAutofill";

/// Register the panel so it comes back after every navigation.
pub async fn register(page: &CrPage) -> Result<()> {
    page.execute(AddScriptToEvaluateOnNewDocumentParams::new(PANEL_JS))
        .await
        .map_err(|e| Error::JsError(format!("Failed to register autofill panel: {e}")))?;
    Ok(())
}

/// Wrap an expression on the overlay object so a missing overlay surfaces as
/// a JS error instead of `undefined`.
pub fn call(expression: &str) -> String {
    format!(
        "(() => {{ const fa = {OVERLAY_GLOBAL}; \
         if (!fa) throw new Error('form autofill panel is not installed'); \
         return fa.{expression}; }})()"
    )
}

/// Idempotent: a second evaluation finds the global and returns.
pub static PANEL_JS: &str = r#"
(() => {
  const boot = () => {
    if (window.__formAutofill || !document.body) return;

    const FILLABLE = 'input, textarea, select';
    const SKIP_TYPES = ['hidden', 'submit', 'button', 'reset', 'image', 'file', 'range', 'color'];
    const MAX_ANCESTOR_DEPTH = 3;
    const MAX_TEXT = 200;
    const PANEL_ID = 'form-autofill-panel';
    const HIGHLIGHT = 'form-autofill-highlight';

    const state = { trigger: null, closed: false, selecting: false, selection: null, nextId: 0, nextScope: 0 };

    const clean = (s) => (s || '').replace(/\s+/g, ' ').trim().slice(0, MAX_TEXT);
    const textOf = (node) => (node ? clean(node.innerText || node.textContent) : '');
    const inPanel = (el) => !!(el && el.closest && el.closest('#' + PANEL_ID));
    const isFillable = (el) =>
      el.matches(FILLABLE) && !SKIP_TYPES.includes((el.type || '').toLowerCase()) && !inPanel(el);
    const fillablesIn = (root) => Array.from(root.querySelectorAll(FILLABLE)).filter(isFillable);
    // Boxless elements sit under a display:none ancestor; visibility is inherited.
    const rendered = (el) => {
      if (typeof el.checkVisibility === 'function') {
        return el.checkVisibility({ visibilityProperty: true, checkVisibilityCSS: true });
      }
      return el.getClientRects().length > 0 && window.getComputedStyle(el).visibility !== 'hidden';
    };

    const stamp = (el) => {
      if (!el.dataset.autofillId) el.dataset.autofillId = 'af-' + state.nextId++;
      return el.dataset.autofillId;
    };
    const byHandle = (handle) => document.querySelector('[data-autofill-id="' + CSS.escape(handle) + '"]');

    // Label text without the text of any control nested in the label.
    const labelText = (label) => {
      const copy = label.cloneNode(true);
      copy.querySelectorAll(FILLABLE + ', option').forEach((n) => n.remove());
      return clean(copy.textContent);
    };
    const idRefText = (ids) =>
      clean((ids || '').split(/\s+/).filter(Boolean).map((id) => textOf(document.getElementById(id))).join(' '));

    const labelByRef = (el) => {
      const parts = [];
      if (el.id) {
        document.querySelectorAll('label[for="' + CSS.escape(el.id) + '"]').forEach((l) => parts.push(labelText(l)));
      }
      parts.push(idRefText(el.getAttribute('aria-labelledby')));
      return clean(parts.filter(Boolean).join(' '));
    };
    const labelEnclosing = (el) => {
      const label = el.closest('label');
      return label ? labelText(label) : '';
    };
    const labelPreceding = (el, root) => {
      let node = el.closest('label') || el;
      for (let depth = 0; node && depth < MAX_ANCESTOR_DEPTH; depth++) {
        for (let sib = node.previousSibling; sib; sib = sib.previousSibling) {
          if (sib.nodeType === Node.TEXT_NODE) {
            const t = clean(sib.textContent);
            if (t) return t;
            continue;
          }
          if (sib.nodeType !== Node.ELEMENT_NODE || sib.matches('script, style')) continue;
          // Text next to another control belongs to that control.
          if (sib.matches(FILLABLE) || sib.querySelector(FILLABLE)) return '';
          const t = textOf(sib);
          if (t) return t;
        }
        if (node === root) break;
        node = node.parentElement;
      }
      return '';
    };
    const groupByRef = (el) => {
      const group = el.closest('[role="radiogroup"], [role="group"]');
      if (!group) return '';
      return idRefText(group.getAttribute('aria-labelledby')) || clean(group.getAttribute('aria-label'));
    };
    const groupLegend = (el) => {
      const fieldset = el.closest('fieldset');
      const legend = fieldset && fieldset.querySelector('legend');
      return legend ? textOf(legend) : '';
    };

    const docRect = (el) => {
      const r = el.getBoundingClientRect();
      return { top: r.top + window.scrollY, left: r.left + window.scrollX, width: r.width, height: r.height };
    };

    const describe = (el, index, root) => {
      const tag = el.tagName.toLowerCase();
      return {
        handle: stamp(el),
        doc_index: index,
        tag,
        type: (el.type || '').toLowerCase(),
        name: el.name || '',
        id: el.id || '',
        value: el.value || '',
        checked: !!el.checked,
        multiple: !!el.multiple,
        required: !!el.required,
        disabled: !!el.disabled,
        visible: rendered(el) || !!(el.labels && el.labels.length > 0 && rendered(el.labels[0])),
        placeholder: clean(el.getAttribute('placeholder')),
        title: clean(el.getAttribute('title')),
        label_by_ref: labelByRef(el),
        label_enclosing: labelEnclosing(el),
        label_preceding: labelPreceding(el, root),
        group_label_by_ref: groupByRef(el),
        group_legend: groupLegend(el),
        rect: docRect(el),
        options: tag === 'select'
          ? Array.from(el.options).map((o) => ({ label: clean(o.label || o.textContent), value: o.value, selected: o.selected }))
          : [],
      };
    };

    const containerFor = (target) =>
      target.closest('form, fieldset') || (isFillable(target) ? target.parentElement || target : target);

    const clearHighlight = () =>
      document.querySelectorAll('.' + HIGHLIGHT).forEach((n) => n.classList.remove(HIGHLIGHT));

    document.addEventListener('mouseover', (e) => {
      if (!state.selecting || inPanel(e.target)) return;
      clearHighlight();
      containerFor(e.target).classList.add(HIGHLIGHT);
    }, true);

    document.addEventListener('click', (e) => {
      if (!state.selecting || inPanel(e.target)) return;
      e.preventDefault();
      e.stopPropagation();
      const container = containerFor(e.target);
      if (!container.dataset.autofillScope) container.dataset.autofillScope = 'scope-' + state.nextScope++;
      state.selection = {
        scope_id: container.dataset.autofillScope,
        tag: container.tagName.toLowerCase(),
        rect: docRect(container),
        controls: fillablesIn(container).map((el, i) => describe(el, i, container)),
      };
    }, true);

    const style = document.createElement('style');
    style.textContent = `
      .${HIGHLIGHT} { outline: 2px solid #ff9800 !important; outline-offset: 2px !important; }
      #${PANEL_ID} { position: fixed; top: 20px; right: 20px; width: 240px; z-index: 2147483647;
        background: #fff; border: 2px solid #4caf50; border-radius: 8px; padding: 12px;
        font: 13px Arial, sans-serif; color: #333; box-shadow: 0 4px 12px rgba(0,0,0,.15); }
      #${PANEL_ID} .fa-title { font-weight: bold; color: #4caf50; margin-bottom: 6px; }
      #${PANEL_ID} .fa-close { float: right; cursor: pointer; color: #999; }
      #${PANEL_ID} button { display: block; width: 100%; margin: 6px 0; padding: 7px; border: 0;
        border-radius: 4px; color: #fff; cursor: pointer; }
      #${PANEL_ID} .fa-select { background: #4caf50; }
      #${PANEL_ID} .fa-start { background: #2196f3; }
      #${PANEL_ID} .fa-status { font-size: 12px; color: #666; }
    `;
    (document.head || document.documentElement).appendChild(style);

    const panel = document.createElement('div');
    panel.id = PANEL_ID;
    panel.innerHTML = `
      <div class="fa-title">Form AutoFill <span class="fa-close" title="Close">&times;</span></div>
      <button class="fa-select">Select form area</button>
      <button class="fa-start">Start auto-fill</button>
      <div class="fa-status">Ready to select a form area</div>`;
    document.body.appendChild(panel);
    panel.querySelector('.fa-select').addEventListener('click', () => { state.trigger = 'select_area'; });
    panel.querySelector('.fa-start').addEventListener('click', () => { state.trigger = 'start_autofill'; });
    panel.querySelector('.fa-close').addEventListener('click', () => {
      state.closed = true;
      state.selecting = false;
      clearHighlight();
      panel.remove();
    });

    const setNativeValue = (el, value) => {
      const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), 'value');
      if (desc && desc.set) desc.set.call(el, value);
      else el.value = value;
    };

    window.__formAutofill = {
      arm: () => {
        state.selecting = true;
        state.selection = null;
        document.body.style.cursor = 'crosshair';
        return true;
      },
      disarm: () => {
        state.selecting = false;
        clearHighlight();
        document.body.style.cursor = '';
        return true;
      },
      takeSelection: () => {
        const s = state.selection;
        state.selection = null;
        return s ? JSON.stringify(s) : null;
      },
      takeTrigger: () => {
        const t = state.trigger;
        state.trigger = null;
        return t;
      },
      isClosed: () => state.closed,
      setStatus: (text) => {
        const status = panel.querySelector('.fa-status');
        if (status) status.textContent = text;
        return true;
      },
      read: (handle) => {
        const el = byHandle(handle);
        if (!el) return null;
        return JSON.stringify({
          value: el.value || '',
          checked: !!el.checked,
          selected: el.tagName.toLowerCase() === 'select' ? Array.from(el.selectedOptions).map((o) => o.value) : [],
        });
      },
      clear: (handle) => {
        const el = byHandle(handle);
        if (!el) return false;
        el.focus();
        setNativeValue(el, '');
        el.dispatchEvent(new Event('input', { bubbles: true }));
        return true;
      },
      insert: (handle, text) => {
        const el = byHandle(handle);
        if (!el) return false;
        el.focus();
        setNativeValue(el, (el.value || '') + text);
        el.dispatchEvent(new Event('input', { bubbles: true }));
        return true;
      },
      select: (handle, values) => {
        const el = byHandle(handle);
        if (!el) return false;
        Array.from(el.options).forEach((o) => { o.selected = values.includes(o.value); });
        el.dispatchEvent(new Event('input', { bubbles: true }));
        el.dispatchEvent(new Event('change', { bubbles: true }));
        return true;
      },
      click: (handle) => {
        const el = byHandle(handle);
        if (!el) return false;
        el.click();
        return true;
      },
    };
  };

  if (document.readyState === 'loading') document.addEventListener('DOMContentLoaded', boot);
  else boot();
})();
"#;
