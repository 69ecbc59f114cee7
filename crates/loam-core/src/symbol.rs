use std::sync::atomic::{AtomicU64, Ordering};

use hashbrown::HashMap;
use lasso::{Rodeo, Spur};

/// Process-wide monotonic counters. The upstream engine guarded exactly these
/// two with a mutex and nothing else; the port keeps that contract with
/// atomics.
static GENSYM_ID: AtomicU64 = AtomicU64::new(0);
static GENCLASS_ID: AtomicU64 = AtomicU64::new(0);

pub fn next_gensym_id() -> u64 {
    GENSYM_ID.fetch_add(1, Ordering::Relaxed)
}

pub fn next_class_id() -> u64 {
    GENCLASS_ID.fetch_add(1, Ordering::Relaxed)
}

/// Dense id of an interned symbol or keyword. Two symbols with the same
/// `(namespace, name)` intern to the same id, so id equality is symbol
/// equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SymId(pub u32);

/// Precomputed special-form dispatch id. Stored on the interned symbol so the
/// evaluator never compares strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Syntax {
    Fn,
    Quote,
    Var,
    Def,
    If,
    Do,
    Let,
    Cond,
    LazySeq,
    Delay,
    And,
    Or,
    Macro,
    Try,
    Catch,
    Loop,
    Recur,
    SetBang,
    Thread,
}

const SYNTAX_NAMES: &[(&str, Syntax)] = &[
    ("fn", Syntax::Fn),
    ("quote", Syntax::Quote),
    ("var", Syntax::Var),
    ("def", Syntax::Def),
    ("if", Syntax::If),
    ("do", Syntax::Do),
    ("let", Syntax::Let),
    ("cond", Syntax::Cond),
    ("lazy-seq", Syntax::LazySeq),
    ("delay", Syntax::Delay),
    ("and", Syntax::And),
    ("or", Syntax::Or),
    ("macro", Syntax::Macro),
    ("try", Syntax::Try),
    ("catch", Syntax::Catch),
    ("loop", Syntax::Loop),
    ("recur", Syntax::Recur),
    ("set!", Syntax::SetBang),
    ("thread", Syntax::Thread),
];

struct SymInfo {
    ns: Option<Spur>,
    name: Spur,
    hash: u64,
    syntax: Option<Syntax>,
}

/// The oblist: every symbol and keyword the runtime has ever seen, interned
/// once. Owned by the interpreter (explicit context, not a process global).
/// Also owns the closed single-inheritance exception-class hierarchy.
pub struct SymbolTable {
    strings: Rodeo,
    index: HashMap<(Option<Spur>, Spur), SymId>,
    syms: Vec<SymInfo>,
    /// class symbol -> parent class symbol (absent for the hierarchy root)
    parents: HashMap<SymId, SymId>,
    classes: Vec<SymId>,
}

/// Built-in exception classes and their parents, rooted at Throwable.
pub struct Classes {
    pub throwable: SymId,
    pub out_of_memory: SymId,
    pub runtime: SymId,
    pub null_pointer: SymId,
    pub arity: SymId,
    pub illegal_argument: SymId,
    pub number_format: SymId,
    pub arithmetic: SymId,
    pub class_cast: SymId,
    pub illegal_state: SymId,
}

impl SymbolTable {
    pub fn new() -> (SymbolTable, Classes) {
        let mut table = SymbolTable {
            strings: Rodeo::default(),
            index: HashMap::new(),
            syms: Vec::new(),
            parents: HashMap::new(),
            classes: Vec::new(),
        };
        // Pre-intern the special forms so their syntax ids exist before any
        // reading happens.
        for (name, _) in SYNTAX_NAMES {
            table.intern(None, name);
        }
        let throwable = table.intern(None, "Throwable");
        let out_of_memory = table.intern(None, "OutOfMemoryError");
        let runtime = table.intern(None, "RuntimeException");
        let null_pointer = table.intern(None, "NullPointerException");
        let arity = table.intern(None, "ArityException");
        let illegal_argument = table.intern(None, "IllegalArgumentException");
        let number_format = table.intern(None, "NumberFormatException");
        let arithmetic = table.intern(None, "ArithmeticException");
        let class_cast = table.intern(None, "ClassCastException");
        let illegal_state = table.intern(None, "IllegalStateException");

        table.register_class(throwable, None);
        table.register_class(out_of_memory, Some(throwable));
        table.register_class(runtime, Some(throwable));
        table.register_class(null_pointer, Some(runtime));
        table.register_class(arity, Some(runtime));
        table.register_class(illegal_argument, Some(runtime));
        table.register_class(number_format, Some(illegal_argument));
        table.register_class(arithmetic, Some(runtime));
        table.register_class(class_cast, Some(runtime));
        table.register_class(illegal_state, Some(runtime));

        let classes = Classes {
            throwable,
            out_of_memory,
            runtime,
            null_pointer,
            arity,
            illegal_argument,
            number_format,
            arithmetic,
            class_cast,
            illegal_state,
        };
        (table, classes)
    }

    /// Find-or-create the symbol for `(ns, name)`.
    pub fn intern(&mut self, ns: Option<&str>, name: &str) -> SymId {
        let ns_spur = ns.map(|n| self.strings.get_or_intern(n));
        let name_spur = self.strings.get_or_intern(name);
        if let Some(id) = self.index.get(&(ns_spur, name_spur)) {
            return *id;
        }
        let id = SymId(self.syms.len() as u32);
        let syntax = if ns.is_none() {
            SYNTAX_NAMES
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, s)| *s)
        } else {
            None
        };
        self.syms.push(SymInfo {
            ns: ns_spur,
            name: name_spur,
            hash: str_hash(name),
            syntax,
        });
        self.index.insert((ns_spur, name_spur), id);
        id
    }

    /// Intern a possibly `ns/name`-qualified symbol from its printed form.
    pub fn intern_qualified(&mut self, text: &str) -> SymId {
        match split_qualified(text) {
            Some((ns, name)) => self.intern(Some(ns), name),
            None => self.intern(None, text),
        }
    }

    pub fn name(&self, id: SymId) -> &str {
        self.strings.resolve(&self.syms[id.0 as usize].name)
    }

    pub fn namespace(&self, id: SymId) -> Option<&str> {
        self.syms[id.0 as usize]
            .ns
            .map(|s| self.strings.resolve(&s))
    }

    /// Printed form, `ns/name` when qualified.
    pub fn qualified_name(&self, id: SymId) -> String {
        match self.namespace(id) {
            Some(ns) => format!("{}/{}", ns, self.name(id)),
            None => self.name(id).to_string(),
        }
    }

    pub fn hash(&self, id: SymId) -> u64 {
        self.syms[id.0 as usize].hash
    }

    pub fn syntax(&self, id: SymId) -> Option<Syntax> {
        self.syms[id.0 as usize].syntax
    }

    /// Strip the namespace from a qualified symbol, interning the bare name.
    pub fn bare(&mut self, id: SymId) -> SymId {
        match self.syms[id.0 as usize].ns {
            None => id,
            Some(_) => {
                let name = self.name(id).to_string();
                self.intern(None, &name)
            }
        }
    }

    // ── Exception-class hierarchy ───────────────────────────────────

    pub fn register_class(&mut self, class: SymId, parent: Option<SymId>) {
        if let Some(p) = parent {
            self.parents.insert(class, p);
        }
        if !self.classes.contains(&class) {
            self.classes.push(class);
        }
    }

    pub fn is_class(&self, sym: SymId) -> bool {
        self.classes.contains(&sym)
    }

    /// Single-inheritance `isa?`: walks the parent chain.
    pub fn isa(&self, child: SymId, ancestor: SymId) -> bool {
        let mut cur = child;
        loop {
            if cur == ancestor {
                return true;
            }
            match self.parents.get(&cur) {
                Some(p) => cur = *p,
                None => return false,
            }
        }
    }
}

/// FNV-1a over the symbol name; precomputed at interning so environment
/// bucket selection never re-hashes.
fn str_hash(s: &str) -> u64 {
    let mut h: u64 = 0xcbf2_9ce4_8422_2325;
    for b in s.bytes() {
        h ^= b as u64;
        h = h.wrapping_mul(0x100_0000_01b3);
    }
    h
}

/// Split `ns/name`. A single leading or trailing slash (the division symbol,
/// `foo/`) is not a qualification.
pub fn split_qualified(text: &str) -> Option<(&str, &str)> {
    let idx = text.find('/')?;
    if idx == 0 || idx == text.len() - 1 || text == "/" {
        return None;
    }
    Some((&text[..idx], &text[idx + 1..]))
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new().0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 1. Interning is idempotent: same (ns, name) -> same id
    #[test]
    fn intern_identity() {
        let (mut t, _) = SymbolTable::new();
        let a = t.intern(None, "foo");
        let b = t.intern(None, "foo");
        assert_eq!(a, b);
        let c = t.intern(Some("core"), "foo");
        assert_ne!(a, c);
        assert_eq!(t.intern(Some("core"), "foo"), c);
    }

    // 2. Qualified interning splits on the first slash
    #[test]
    fn qualified_split() {
        let (mut t, _) = SymbolTable::new();
        let q = t.intern_qualified("str/join");
        assert_eq!(t.namespace(q), Some("str"));
        assert_eq!(t.name(q), "join");
        assert_eq!(t.qualified_name(q), "str/join");
        // Bare division symbol stays unqualified.
        let div = t.intern_qualified("/");
        assert_eq!(t.namespace(div), None);
        assert_eq!(t.name(div), "/");
    }

    // 3. Special forms carry syntax ids; ordinary symbols do not
    #[test]
    fn syntax_ids() {
        let (mut t, _) = SymbolTable::new();
        let if_sym = t.intern(None, "if");
        assert_eq!(t.syntax(if_sym), Some(Syntax::If));
        let plus = t.intern(None, "+");
        assert_eq!(t.syntax(plus), None);
        // Qualified "other/if" is not a special form.
        let q = t.intern(Some("other"), "if");
        assert_eq!(t.syntax(q), None);
    }

    // 4. isa? walks single inheritance up to Throwable
    #[test]
    fn isa_walks_parents() {
        let (t, c) = SymbolTable::new();
        assert!(t.isa(c.number_format, c.illegal_argument));
        assert!(t.isa(c.number_format, c.runtime));
        assert!(t.isa(c.number_format, c.throwable));
        assert!(t.isa(c.throwable, c.throwable));
        assert!(!t.isa(c.throwable, c.runtime));
        assert!(!t.isa(c.arithmetic, c.illegal_argument));
    }

    // 5. Hash is precomputed and stable
    #[test]
    fn name_hash_stable() {
        let (mut t, _) = SymbolTable::new();
        let a = t.intern(None, "alpha");
        let b = t.intern(None, "alpha");
        assert_eq!(t.hash(a), t.hash(b));
        assert_ne!(t.hash(a), 0);
    }

    // 6. Gensym counter is monotonic
    #[test]
    fn gensym_monotonic() {
        let a = next_gensym_id();
        let b = next_gensym_id();
        assert!(b > a);
    }

    // 7. bare() strips qualification
    #[test]
    fn bare_strips_namespace() {
        let (mut t, _) = SymbolTable::new();
        let q = t.intern(Some("str"), "join");
        let b = t.bare(q);
        assert_eq!(t.namespace(b), None);
        assert_eq!(t.name(b), "join");
    }
}
