use jverify::jvm::class_file::ClassFile;
use jverify::jvm::class_graph::{ClassData, ClassGraph};
use jverify::jvm::verifier::RuntimeAccess;
use jverify::jvm::{BinaryName, Error, Name};
use std::cell::RefCell;
use std::collections::HashSet;
use std::path::PathBuf;

/// Classes loaded on demand from directories of `.class` files
///
/// A class gets added to the class graph the first time the verifier asks for it. Since the graph
/// only accepts classes whose supertypes are already present, supertypes are loaded first.
pub struct ClassPath<'a, 'g> {
    class_graph: &'a ClassGraph<'g>,
    roots: Vec<PathBuf>,

    /// Names that loading was already attempted for
    attempted: RefCell<HashSet<BinaryName>>,
}

impl<'a, 'g> ClassPath<'a, 'g> {
    pub fn new(class_graph: &'a ClassGraph<'g>, roots: Vec<PathBuf>) -> ClassPath<'a, 'g> {
        ClassPath {
            class_graph,
            roots,
            attempted: RefCell::new(HashSet::new()),
        }
    }

    /// Add a class file to the graph, loading its superclass and interfaces first
    pub fn add_class_file(&self, class_file: &ClassFile) -> Result<&'g ClassData<'g>, Error> {
        if let Some(superclass) = class_file.super_class_name()? {
            self.lookup_class(&superclass);
        }
        for interface in class_file.interface_names()? {
            self.lookup_class(&interface);
        }
        self.class_graph.add_class_file(class_file)
    }

    fn find(&self, name: &BinaryName) -> Option<PathBuf> {
        let file_name = format!("{}.class", name.as_str());
        self.roots
            .iter()
            .map(|root| root.join(&file_name))
            .find(|path| path.is_file())
    }

    fn load(&self, name: &BinaryName) -> Result<Option<&'g ClassData<'g>>, Error> {
        let path = match self.find(name) {
            Some(path) => path,
            None => return Ok(None),
        };
        log::debug!("Loading {} from {:?}", name, path);
        let class_file = ClassFile::load_from_path(&path)?;
        self.add_class_file(&class_file).map(Some)
    }
}

impl<'a, 'g> RuntimeAccess<'g> for ClassPath<'a, 'g> {
    fn lookup_class(&self, name: &BinaryName) -> Option<&'g ClassData<'g>> {
        if let Some(class) = self.class_graph.lookup_class(name) {
            return Some(class);
        }

        // Also stops cyclic supertypes from recursing forever
        if !self.attempted.borrow_mut().insert(name.clone()) {
            return None;
        }

        match self.load(name) {
            Ok(Some(class)) => Some(class),
            Ok(None) => {
                log::warn!("Class {} is not on the class path", name);
                None
            }
            Err(err) => {
                log::warn!("Failed to load class {}: {}", name, err);
                None
            }
        }
    }
}
