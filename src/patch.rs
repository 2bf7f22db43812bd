//! Script injected at the top of every rewritten HTML document. It runs in
//! the embedded page's own context and routes script-driven requests back
//! through the proxy. Interception is best effort: a hardened page can still
//! build requests the patch does not see.

pub const CLIENT_PATCH: &str = r##"<script data-frameproxy-patch>
(function () {
    'use strict';
    if (window.__frameproxyPatched) { return; }
    window.__frameproxyPatched = true;

    var PREFIX = '/proxy?url=';
    // Keep a handle on the real parent before frame-bust protection below
    // makes window.parent point back at this window.
    var REAL_PARENT = window.parent;

    // The original page URL travels in the proxy's own query parameter and
    // is the resolution base for anything the page builds at runtime.
    var BASE = (function () {
        try {
            var raw = new URLSearchParams(window.location.search).get('url');
            if (raw) { return raw; }
        } catch (e) { /* no query access */ }
        return window.location.href;
    })();

    function rewrite(value) {
        if (typeof value !== 'string' || value === '') { return value; }
        if (value.indexOf(PREFIX) !== -1) { return value; }
        if (/^(data:|blob:|about:|javascript:|mailto:|#)/i.test(value)) { return value; }
        try {
            var resolved = new URL(value, BASE);
            if (resolved.protocol !== 'http:' && resolved.protocol !== 'https:') { return value; }
            return PREFIX + encodeURIComponent(resolved.href);
        } catch (e) {
            return value;
        }
    }

    function rewriteSrcset(value) {
        if (typeof value !== 'string') { return value; }
        return value.split(',').map(function (entry) {
            var parts = entry.trim().split(/\s+/);
            if (parts[0]) { parts[0] = rewrite(parts[0]); }
            return parts.join(' ');
        }).join(', ');
    }

    var realFetch = window.fetch;
    window.fetch = function (input, init) {
        if (typeof input === 'string') {
            return realFetch.call(window, rewrite(input), init);
        }
        if (input && typeof input.url === 'string') {
            return realFetch.call(window, new Request(rewrite(input.url), input), init);
        }
        return realFetch.call(window, input, init);
    };

    var realOpen = XMLHttpRequest.prototype.open;
    XMLHttpRequest.prototype.open = function (method, url) {
        var args = Array.prototype.slice.call(arguments);
        args[1] = rewrite(String(url));
        return realOpen.apply(this, args);
    };

    if (window.Worker) {
        var RealWorker = window.Worker;
        window.Worker = function (url, options) {
            return new RealWorker(rewrite(String(url)), options);
        };
        window.Worker.prototype = RealWorker.prototype;
    }

    ['pushState', 'replaceState'].forEach(function (name) {
        var real = history[name];
        history[name] = function (state, title, url) {
            if (url !== undefined && url !== null) { url = rewrite(String(url)); }
            return real.call(this, state, title, url);
        };
    });

    // Image-constructor preloading goes through the same setter as any
    // other <img>, patched below, but scripts also read back .src, so the
    // constructor itself is kept native.
    function patchProperty(proto, property, rewriter) {
        try {
            var descriptor = Object.getOwnPropertyDescriptor(proto, property);
            if (!descriptor || !descriptor.set) { return; }
            Object.defineProperty(proto, property, {
                get: descriptor.get,
                set: function (value) { descriptor.set.call(this, rewriter(String(value))); },
                configurable: true
            });
        } catch (e) { /* leave the native setter alone */ }
    }

    patchProperty(HTMLAnchorElement.prototype, 'href', rewrite);
    patchProperty(HTMLImageElement.prototype, 'src', rewrite);
    patchProperty(HTMLImageElement.prototype, 'srcset', rewriteSrcset);
    patchProperty(HTMLScriptElement.prototype, 'src', rewrite);
    patchProperty(HTMLIFrameElement.prototype, 'src', rewrite);
    patchProperty(HTMLLinkElement.prototype, 'href', rewrite);
    patchProperty(HTMLFormElement.prototype, 'action', rewrite);
    patchProperty(HTMLMediaElement.prototype, 'src', rewrite);
    patchProperty(HTMLSourceElement.prototype, 'src', rewrite);
    patchProperty(HTMLSourceElement.prototype, 'srcset', rewriteSrcset);

    // New browsing contexts would escape both the proxy and the embedding
    // page. Hand the decision to the embedder instead.
    function requestOpen(url) {
        try {
            REAL_PARENT.postMessage({ type: 'proxy:open', url: url }, '*');
        } catch (e) { /* no parent listening */ }
    }

    function originalUrl(href) {
        var at = href.indexOf(PREFIX);
        if (at !== -1) {
            try { return decodeURIComponent(href.slice(at + PREFIX.length)); } catch (e) { /* keep */ }
        }
        return href;
    }

    window.open = function (url) {
        if (url) {
            try { requestOpen(new URL(originalUrl(String(url)), BASE).href); } catch (e) { /* ignore */ }
        }
        return null;
    };

    document.addEventListener('click', function (event) {
        var node = event.target;
        while (node && node.tagName !== 'A') { node = node.parentElement; }
        if (!node || node.target !== '_blank') { return; }
        event.preventDefault();
        try {
            requestOpen(new URL(originalUrl(node.getAttribute('href') || ''), BASE).href);
        } catch (e) { /* unresolvable href */ }
    }, true);

    // Frame busting: make the page see itself as the top window. Some sites
    // lock these properties down harder than defineProperty can reach.
    try {
        Object.defineProperty(window, 'top', { get: function () { return window.self; } });
    } catch (e) { /* non-configurable */ }
    try {
        Object.defineProperty(window, 'parent', { get: function () { return window.self; } });
    } catch (e) { /* non-configurable */ }
})();
</script>"##;
