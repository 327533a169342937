//! Emitted string decoder
//!
//! The JS inverse of the wave-transform concealer, mirroring its
//! arithmetic operation for operation (imul/&>>> keep everything in
//! 32-bit lanes). The decoder is proxy-wrapped with an advisory
//! self-integrity check: the xorshift step function's stringified length
//! is stashed at load time and compared on every call.

use super::ops::VmNames;
use super::writer::JsWriter;

pub fn emit_decoder(w: &mut JsWriter, names: &VmNames) {
    let d = &names.decoder;
    let pool = &names.pool;

    w.open(&format!("const {} = (() =>", d));
    w.line("const RS = (s) => { s ^= s << 13; s >>>= 0; s ^= s >>> 17; s ^= s << 5; return s >>> 0; };");
    w.line("const SIG = RS.toString().length;");
    w.line("const TBL = \"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/\";");
    w.open("const B64 = (s) =>");
    w.line("const out = []; let buf = 0, bits = 0;");
    w.open("for (let i = 0; i < s.length; i++)");
    w.line("const c = TBL.indexOf(s[i]);");
    w.line("if (c < 0) continue;");
    w.line("buf = (buf << 6) | c; bits += 6;");
    w.line("if (bits >= 8) { bits -= 8; out.push((buf >> bits) & 255); }");
    w.close("");
    w.line("return out;");
    w.close(";");
    w.open("const U8 = (b) =>");
    w.line("let s = \"\", i = 0;");
    w.open("while (i < b.length)");
    w.line("const c = b[i++];");
    w.line("if (c < 128) s += String.fromCharCode(c);");
    w.line("else if (c < 224) s += String.fromCharCode(((c & 31) << 6) | (b[i++] & 63));");
    w.line("else if (c < 240) s += String.fromCharCode(((c & 15) << 12) | ((b[i++] & 63) << 6) | (b[i++] & 63));");
    w.open("else");
    w.line("let cp = ((c & 7) << 18) | ((b[i++] & 63) << 12) | ((b[i++] & 63) << 6) | (b[i++] & 63);");
    w.line("cp -= 65536;");
    w.line("s += String.fromCharCode(55296 + (cp >> 10), 56320 + (cp & 1023));");
    w.close("");
    w.close("");
    w.line("return s;");
    w.close(";");
    w.line("const CACHE = Object.create(null);");
    w.open("const CORE = (i) =>");
    w.line("if (CACHE[i] !== void 0) return CACHE[i];");
    w.line(format!("const raw = B64({}[i]);", pool));
    w.line("const seed = raw.slice(0, 16), data = raw.slice(16);");
    w.line("let st = 2166136261 >>> 0;");
    w.line("for (let k = 0; k < seed.length; k++) st = Math.imul(st ^ seed[k], 16777619) >>> 0;");
    w.line("if (st === 0) st = 2166136261;");
    w.line("const nx = () => (st = RS(st));");
    w.line("const n = data.length;");
    w.line("const d = nx() % 4 + 2;");
    w.line("let ext = 1;");
    w.line("for (;;) { let p = 1; for (let k = 0; k < d; k++) p *= ext; if (p >= n) break; ext++; }");
    w.line("const strides = new Array(d).fill(1);");
    w.line("for (let k = d - 2; k >= 0; k--) strides[k] = strides[k + 1] * ext;");
    w.line("const wc = Math.max(8, Math.min(64, Math.floor(Math.sqrt(n))));");
    w.line("const waves = [];");
    w.open("for (let k = 0; k < wc; k++)");
    w.line("const o = [];");
    w.line("for (let j = 0; j < d; j++) o.push(nx() % ext);");
    w.line("const a = nx() % 256;");
    w.line("const f = 0.5 + ((nx() % 4096) / 4096) * 4;");
    w.line("const p = ((nx() % 4096) / 4096) * 2 * Math.PI;");
    w.line("const r = nx() % 8 + 1;");
    w.line("waves.push({ o, a, f, p, r });");
    w.close("");
    w.open("for (let wi = waves.length - 1; wi >= 0; wi--)");
    w.line("const wv = waves[wi];");
    w.open("for (let bi = 0; bi < n; bi++)");
    w.line("let ds = 0;");
    w.open("for (let k = 0; k < d; k++)");
    w.line("const c = Math.floor(bi / strides[k]) % ext;");
    w.line("const dd = c - wv.o[k];");
    w.line("ds += dd * dd;");
    w.close("");
    w.line("const m = Math.floor(wv.a * (Math.sin(Math.sqrt(ds) * wv.f + wv.p) + 1) / 2);");
    w.line("const x = data[bi] ^ m;");
    w.line("const r = wv.r & 7;");
    w.line("data[bi] = ((x >>> r) | (x << (8 - r))) & 255;");
    w.close("");
    w.close("");
    w.line("return (CACHE[i] = U8(data));");
    w.close(";");
    w.open("return new Proxy(CORE,");
    w.open("apply(t, th, args)");
    w.line("if (RS.toString().length !== SIG) throw new Error(\"corrupted runtime\");");
    w.line("return Reflect.apply(t, th, args);");
    w.close(",");
    w.close(");");
    w.close(")();");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::Prng;

    #[test]
    fn test_decoder_structure() {
        let mut prng = Prng::new(Some(1));
        let names = VmNames::generate(&mut prng);
        let mut w = JsWriter::new();
        emit_decoder(&mut w, &names);
        let text = w.finish();
        assert!(text.contains("Math.imul(st ^ seed[k], 16777619)"));
        assert!(text.contains("new Proxy(CORE"));
        assert!(text.contains("RS.toString().length !== SIG"));
        assert!(text.contains(&names.pool));
        // Wave parameter consumption order mirrors the encoder.
        let d_pos = text.find("const d = nx() % 4 + 2;").unwrap();
        let wave_pos = text.find("const a = nx() % 256;").unwrap();
        assert!(d_pos < wave_pos);
    }
}
