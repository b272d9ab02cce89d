table! {
    auth_session (session_key) {
        session_key -> Text,
        user_id -> Integer,
        expire_date -> Text,
    }
}

table! {
    auth_user (id) {
        id -> Integer,
        username -> Text,
        email -> Text,
        password -> Text,
        is_staff -> Bool,
        is_active -> Bool,
        is_superuser -> Bool,
    }
}

table! {
    auth_user_permission (id) {
        id -> Integer,
        user_id -> Integer,
        permission -> Text,
    }
}

table! {
    core_category (id) {
        id -> Integer,
        title -> Text,
        slug -> Text,
        tree_parent_id -> Nullable<Integer>,
        tree_path -> Text,
    }
}

table! {
    core_placement (id) {
        id -> Integer,
        target_ct_id -> Integer,
        target_id -> Integer,
        category_id -> Integer,
        slug -> Text,
        publish_from -> Text,
        publish_to -> Nullable<Text>,
        #[sql_name = "static"]
        static_ -> Bool,
    }
}

table! {
    core_publishable (id) {
        id -> Integer,
        content_type_id -> Integer,
        category_id -> Integer,
        title -> Text,
        slug -> Text,
        source_id -> Nullable<Integer>,
        photo_id -> Nullable<Integer>,
        description -> Text,
    }
}

table! {
    django_content_type (id) {
        id -> Integer,
        name -> Text,
        app_label -> Text,
        model -> Text,
    }
}

table! {
    ella_upgrade_history (id) {
        id -> Integer,
        app_name -> Text,
        migration -> Text,
        applied -> Text,
    }
}

table! {
    interviews_answer (id) {
        id -> Integer,
        question_id -> Integer,
        interviewee_id -> Integer,
        content -> Text,
        submit_date -> Text,
    }
}

table! {
    interviews_interview (id) {
        id -> Integer,
        title -> Text,
        slug -> Text,
        category_id -> Integer,
        perex -> Text,
        ask_from -> Text,
        ask_to -> Text,
        reply_from -> Text,
        reply_to -> Text,
    }
}

table! {
    interviews_interview_interviewees (id) {
        id -> Integer,
        interview_id -> Integer,
        interviewee_id -> Integer,
    }
}

table! {
    interviews_interviewee (id) {
        id -> Integer,
        user_id -> Nullable<Integer>,
        name -> Text,
        slug -> Text,
        description -> Text,
    }
}

table! {
    interviews_question (id) {
        id -> Integer,
        interview_id -> Integer,
        user_id -> Nullable<Integer>,
        nickname -> Text,
        email -> Text,
        content -> Text,
        ip_address -> Text,
        submit_date -> Text,
        is_public -> Bool,
    }
}

table! {
    newman_denormalizedcategoryuserrole (id) {
        id -> Integer,
        user_id -> Integer,
        permission_codename -> Text,
        category_id -> Integer,
        root_category_id -> Integer,
    }
}

table! {
    tagging_tag (id) {
        id -> Integer,
        name -> Text,
    }
}

table! {
    tagging_taggeditem (id) {
        id -> Integer,
        tag_id -> Integer,
        content_type_id -> Integer,
        object_id -> Integer,
        priority -> Integer,
    }
}

joinable!(auth_session -> auth_user (user_id));
joinable!(auth_user_permission -> auth_user (user_id));
joinable!(core_placement -> core_category (category_id));
joinable!(core_publishable -> django_content_type (content_type_id));
joinable!(interviews_answer -> interviews_question (question_id));
joinable!(interviews_answer -> interviews_interviewee (interviewee_id));
joinable!(interviews_interview -> core_category (category_id));
joinable!(interviews_interview_interviewees -> interviews_interview (interview_id));
joinable!(interviews_interview_interviewees -> interviews_interviewee (interviewee_id));
joinable!(interviews_question -> interviews_interview (interview_id));
joinable!(newman_denormalizedcategoryuserrole -> auth_user (user_id));
joinable!(tagging_taggeditem -> tagging_tag (tag_id));

allow_tables_to_appear_in_same_query!(
    auth_session,
    auth_user,
    auth_user_permission,
    core_category,
    core_placement,
    core_publishable,
    django_content_type,
    ella_upgrade_history,
    interviews_answer,
    interviews_interview,
    interviews_interview_interviewees,
    interviews_interviewee,
    interviews_question,
    newman_denormalizedcategoryuserrole,
    tagging_tag,
    tagging_taggeditem,
);
