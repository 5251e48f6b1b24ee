use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods and fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, with `/` separating packages
///
/// See <https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq)]
pub struct BinaryName(Cow<'static, str>);

/// Validated names
pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Wrap a string which is already known to be valid
    fn from_valid(name: Cow<'static, str>) -> Self;

    fn as_str(&self) -> &str;

    /// Validate and wrap a string
    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(Self::from_valid(Cow::Owned(name)))
    }
}

/// Formatting and `AsRef<str>` all go straight to the underlying string
macro_rules! string_like_name {
    ($name:ident) => {
        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                self.0.as_ref()
            }
        }

        impl Debug for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
                f.write_str(self.0.as_ref())
            }
        }

        impl Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
                f.write_str(self.0.as_ref())
            }
        }
    };
}

string_like_name!(UnqualifiedName);
string_like_name!(BinaryName);

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(String::from("Unqualified name is empty"));
        }
        match name.chars().find(|c| matches!(c, '.' | ';' | '[' | '/')) {
            Some(c) => Err(format!("Unqualified name '{}' contains illegal '{}'", name, c)),
            None => Ok(()),
        }
    }

    fn from_valid(name: Cow<'static, str>) -> Self {
        UnqualifiedName(name)
    }

    fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

impl Name for BinaryName {
    /// Every `/`-separated segment must be a valid unqualified name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(String::from("Binary name is empty"));
        }
        name.split('/')
            .try_for_each(UnqualifiedName::check_valid)
            .map_err(|err| format!("Bad binary name '{}': {}", name, err))
    }

    fn from_valid(name: Cow<'static, str>) -> Self {
        BinaryName(name)
    }

    fn as_str(&self) -> &str {
        self.0.as_ref()
    }
}

impl UnqualifiedName {
    pub(crate) const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Method names may also be `<init>` or `<clinit>`, but no other name has angle brackets
    pub fn check_valid_method(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name == Self::INIT.as_str() || name == Self::CLINIT.as_str() {
            return Ok(());
        }
        if name.contains(&['<', '>'][..]) {
            return Err(format!("Method name '{}' contains an angle bracket", name));
        }
        Self::check_valid(name)
    }

    pub const CLONE: Self = Self::name("clone");
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");
}

impl BinaryName {
    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Runtime package of the class (everything before the last `/`, possibly empty)
    pub fn package(&self) -> &str {
        let name = self.as_str();
        name.rfind('/').map_or("", |idx| &name[..idx])
    }

    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const COMPARABLE: Self = Self::name("java/lang/Comparable");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
}
