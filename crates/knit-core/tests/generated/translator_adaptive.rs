pub mod org_demo {
    use knit_core::ExtensionLoader;

    pub const POINT: &str = "org.demo.Translator";

    type Loader = ExtensionLoader<dyn crate::Translator>;

    pub struct TranslatorAdaptive {
        loader: std::sync::Weak<Loader>,
    }

    impl TranslatorAdaptive {
        pub fn new(loader: std::sync::Weak<Loader>) -> Self {
            Self { loader }
        }
    }

    impl knit_core::Inject for TranslatorAdaptive {}

    impl crate::Translator for TranslatorAdaptive {
        fn translate(&self, arg0: Option<&knit_core::Url>, arg1: &str) -> knit_core::Result<String> {
            let carrier = Loader::require(arg0, "translate", "arg0")?;
            let ext_name = knit_core::ParameterCarrier::parameter_or(carrier, "lang", "upper");
            Loader::require_name(&ext_name, carrier, &["lang"])?;
            let extension = Loader::upgrade(&self.loader)?.extension(&ext_name)?;
            crate::Translator::translate(&*extension, arg0, arg1)
        }

        fn describe(&self) -> String {
            panic!("{}", Loader::unsupported("describe"))
        }

        fn flush(&self) -> knit_core::Result<()> {
            Err(Loader::unsupported("flush").into())
        }
    }
}
